//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the workflow-automation service and the session
//! endpoint so the orchestrator and the gates can be exercised in process.
//!
//! # Example
//!
//! ```rust,ignore
//! use reelforge_core::testing::{fixtures, MockDispatcher};
//!
//! let dispatcher = Arc::new(MockDispatcher::completing_everything());
//! let orchestrator = RequestOrchestrator::new(config, store, dispatcher.clone());
//! let (request, _) = orchestrator.submit_request(
//!     fixtures::new_content_request("owner-1", RequestType::Image),
//! )?;
//! orchestrator.process_request(&request.id).await?;
//! ```

mod mock_dispatcher;
mod mock_session;

pub use mock_dispatcher::{MockDispatcher, RecordedDispatch};
pub use mock_session::MockSessionIntrospector;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;
    use serde_json::json;

    use crate::campaign::{Campaign, CampaignStatus};
    use crate::pipeline::{
        task_factory, ContentRequest, NewContentRequest, ProviderTier, RequestStatus, RequestTask,
        RequestType,
    };

    fn duration_for(request_type: RequestType) -> Option<u32> {
        match request_type {
            RequestType::Image => None,
            RequestType::VideoWithVo | RequestType::VideoNoVo => Some(30),
        }
    }

    /// A content request in intake with reasonable defaults.
    pub fn content_request(request_type: RequestType) -> ContentRequest {
        let now = Utc::now();
        ContentRequest {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: "owner-1".to_string(),
            brand_id: "brand-1".to_string(),
            campaign_id: Some("camp-1".to_string()),
            title: "Spring launch teaser".to_string(),
            request_type,
            status: RequestStatus::Intake,
            prompt: "A sunrise over the city, product in hand".to_string(),
            duration_seconds: duration_for(request_type),
            aspect_ratio: "16:9".to_string(),
            style_preset: "Realistic".to_string(),
            shot_type: "Medium".to_string(),
            voice_id: request_type.has_voiceover().then(|| "voice-1".to_string()),
            preferred_provider: None,
            provider_tier: ProviderTier::Standard,
            auto_script: true,
            script_text: None,
            selected_kb_ids: vec!["kb-1".to_string()],
            estimated_cost: None,
            estimated_time_seconds: Some(task_factory::estimated_total_duration(request_type)),
            actual_cost: 0.0,
            thumbnail_url: None,
            output_url: None,
            metadata: json!({}),
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The template tasks of `request`, all pending, with three retries.
    pub fn tasks_for(request: &ContentRequest) -> Vec<RequestTask> {
        task_factory::build_tasks(request, 3)
    }

    /// Insert payload for a request owned by `owner_id`.
    pub fn new_content_request(owner_id: &str, request_type: RequestType) -> NewContentRequest {
        NewContentRequest {
            owner_id: owner_id.to_string(),
            brand_id: "brand-1".to_string(),
            campaign_id: None,
            title: format!("{} request", request_type.as_str()),
            request_type,
            prompt: "Show the product solving a morning rush".to_string(),
            duration_seconds: duration_for(request_type),
            aspect_ratio: "9:16".to_string(),
            style_preset: "Cinematic".to_string(),
            shot_type: "Close-up".to_string(),
            voice_id: None,
            preferred_provider: None,
            provider_tier: ProviderTier::Standard,
            auto_script: true,
            script_text: None,
            selected_kb_ids: vec!["kb-1".to_string(), "kb-2".to_string()],
            estimated_cost: Some(1.25),
            estimated_time_seconds: Some(task_factory::estimated_total_duration(request_type)),
            metadata: json!({ "source": "fixture" }),
            idempotency_key: None,
        }
    }

    /// A campaign with the given id and status.
    pub fn campaign(id: &str, status: CampaignStatus) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            brand_id: "brand-1".to_string(),
            name: format!("Campaign {id}"),
            status,
            budget_limit_usd: 150.0,
            current_cost_usd: 0.0,
            metadata: json!({ "budget_tier": "medium" }),
            created_at: now,
            updated_at: now,
        }
    }
}
