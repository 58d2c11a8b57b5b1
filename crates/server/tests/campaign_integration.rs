//! Integration tests for campaigns, brands, knowledge bases and dashboard stats.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestFixture;

async fn create_campaign(fixture: &TestFixture, brand_id: &str, name: &str) -> String {
    let response = fixture
        .post(
            "/api/v1/campaigns",
            json!({ "campaign_name": name, "brand_id": brand_id, "budget_tier": "high" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    response.body["id"].as_str().unwrap().to_string()
}

// =============================================================================
// Brands and knowledge bases
// =============================================================================

#[tokio::test]
async fn test_brand_and_knowledge_base_flow() {
    let fixture = TestFixture::new();
    let brand_id = fixture.create_brand("Acme").await;

    let response = fixture.get(&format!("/api/v1/brands/{brand_id}")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["name"], "Acme");

    let response = fixture
        .post(
            "/api/v1/knowledge-bases",
            json!({ "brand_id": brand_id, "name": "Tone of voice" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let kb_id = response.body["id"].as_str().unwrap().to_string();

    let response = fixture.get(&format!("/api/v1/knowledge-bases/{kb_id}")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["brand_id"], brand_id.as_str());

    let response = fixture
        .get(&format!("/api/v1/knowledge-bases?brand_id={brand_id}"))
        .await;
    assert_eq!(response.body["knowledge_bases"].as_array().unwrap().len(), 1);

    let response = fixture.get("/api/v1/knowledge-bases?brand_id=other").await;
    assert_eq!(response.body["knowledge_bases"], json!([]));
}

#[tokio::test]
async fn test_knowledge_base_needs_own_brand() {
    let fixture = TestFixture::new();
    let brand_id = fixture.create_brand("Acme").await;

    let response = fixture
        .request(
            "POST",
            "/api/v1/knowledge-bases",
            Some(json!({ "brand_id": brand_id, "name": "Facts" })),
            &[("x-dev-user", "user-2")],
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_brand_validation() {
    let fixture = TestFixture::new();

    let response = fixture.post("/api/v1/brands", json!({ "name": "" })).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(response.body["error"]["fields"][0]["field"], "name");
}

// =============================================================================
// Campaigns
// =============================================================================

#[tokio::test]
async fn test_create_campaign_requires_known_brand() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/campaigns",
            json!({ "name": "Launch", "brand_id": "missing-brand" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_create_campaign_validates_fields() {
    let fixture = TestFixture::new();

    let response = fixture
        .post("/api/v1/campaigns", json!({ "name": "  ", "brand_id": "" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = response.body["error"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"brand_id"));
}

#[tokio::test]
async fn test_campaign_lifecycle() {
    let fixture = TestFixture::new();
    let brand_id = fixture.create_brand("Acme").await;
    let id = create_campaign(&fixture, &brand_id, "Spring launch").await;

    let response = fixture.get(&format!("/api/v1/campaigns/{id}")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "draft");
    assert_eq!(response.body["budget_limit_usd"], 500.0);
    assert_eq!(response.body["metadata"]["budget_tier"], "high");

    let response = fixture
        .put(
            &format!("/api/v1/campaigns/{id}"),
            json!({ "status": "active", "name": "Spring launch v2" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "active");
    assert_eq!(response.body["name"], "Spring launch v2");

    let response = fixture
        .put(&format!("/api/v1/campaigns/{id}"), json!({}))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = fixture.delete(&format!("/api/v1/campaigns/{id}")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "pending_deletion");

    // Soft-deleted campaigns are read-only until restored
    let response = fixture
        .put(&format!("/api/v1/campaigns/{id}"), json!({ "name": "Nope" }))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = fixture
        .post(&format!("/api/v1/campaigns/{id}/restore"), json!({}))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "draft");

    let response = fixture
        .post(&format!("/api/v1/campaigns/{id}/restore"), json!({}))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_campaigns_filters() {
    let fixture = TestFixture::new();
    let brand_id = fixture.create_brand("Acme").await;
    let first = create_campaign(&fixture, &brand_id, "One").await;
    create_campaign(&fixture, &brand_id, "Two").await;
    create_campaign(&fixture, &brand_id, "Three").await;

    fixture
        .put(
            &format!("/api/v1/campaigns/{first}"),
            json!({ "status": "active" }),
        )
        .await;

    let response = fixture.get("/api/v1/campaigns?limit=2").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["total"], 3);
    assert_eq!(response.body["limit"], 2);
    assert_eq!(response.body["campaigns"].as_array().unwrap().len(), 2);

    let response = fixture.get("/api/v1/campaigns?status=active").await;
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["campaigns"][0]["id"], first.as_str());

    let response = fixture.get("/api/v1/campaigns?status=exploded").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"]["fields"][0]["field"], "status");

    let response = fixture.get("/api/v1/campaigns?limit=lots").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_campaigns_are_owner_scoped() {
    let fixture = TestFixture::new();
    let brand_id = fixture.create_brand("Acme").await;
    let id = create_campaign(&fixture, &brand_id, "Private").await;

    let response = fixture
        .request(
            "GET",
            &format!("/api/v1/campaigns/{id}"),
            None,
            &[("x-dev-user", "user-2")],
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = fixture
        .request(
            "DELETE",
            &format!("/api/v1/campaigns/{id}"),
            None,
            &[("x-dev-user", "user-2")],
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dashboard_stats_hide_deleted_campaigns() {
    let fixture = TestFixture::new();
    let brand_id = fixture.create_brand("Acme").await;
    let active = create_campaign(&fixture, &brand_id, "Active").await;
    create_campaign(&fixture, &brand_id, "Draft").await;
    let deleted = create_campaign(&fixture, &brand_id, "Deleted").await;

    fixture
        .put(
            &format!("/api/v1/campaigns/{active}"),
            json!({ "status": "active" }),
        )
        .await;
    fixture.delete(&format!("/api/v1/campaigns/{deleted}")).await;

    let response = fixture.get("/api/v1/dashboard/stats").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["total_campaigns"], 2);
    assert_eq!(response.body["active_campaigns"], 1);
    assert_eq!(response.body["campaigns_by_status"]["active"], 1);
    assert_eq!(response.body["campaigns_by_status"]["draft"], 1);
    assert!(response.body["campaigns_by_status"]
        .get("pending_deletion")
        .is_none());
    assert_eq!(response.body["recent_campaigns"].as_array().unwrap().len(), 2);
    assert_eq!(response.body["total_requests"], 0);
}

#[tokio::test]
async fn test_campaign_progress() {
    let fixture = TestFixture::new();
    let brand_id = fixture.create_brand("Acme").await;
    let id = create_campaign(&fixture, &brand_id, "Launch").await;

    let response = fixture
        .get(&format!("/api/v1/campaigns/{id}/progress"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["campaign_id"], id.as_str());
    assert_eq!(response.body["total_requests"], 0);

    let response = fixture.get("/api/v1/campaigns/unknown/progress").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
