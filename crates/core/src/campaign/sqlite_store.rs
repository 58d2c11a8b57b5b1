//! SQLite-backed campaign store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    Campaign, CampaignError, CampaignFilter, CampaignPatch, CampaignStatus, CampaignStore,
    NewCampaign,
};

const COLUMNS: &str = "id, owner_id, brand_id, name, status, budget_limit_usd, current_cost_usd, \
     metadata, created_at, updated_at";

pub struct SqliteCampaignStore {
    conn: Mutex<Connection>,
}

impl SqliteCampaignStore {
    pub fn new(path: &Path) -> Result<Self, CampaignError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, CampaignError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CampaignError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                brand_id TEXT NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                budget_limit_usd REAL NOT NULL,
                current_cost_usd REAL NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_campaigns_owner ON campaigns(owner_id, updated_at);
            CREATE INDEX IF NOT EXISTS idx_campaigns_brand ON campaigns(brand_id);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CampaignError> {
        self.conn
            .lock()
            .map_err(|_| CampaignError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &CampaignFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = vec!["owner_id = ?"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(filter.owner_id.clone())];

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }
        if let Some(ref brand_id) = filter.brand_id {
            conditions.push("brand_id = ?");
            params.push(Box::new(brand_id.clone()));
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }

    fn row_to_campaign(row: &rusqlite::Row) -> rusqlite::Result<Campaign> {
        let status: String = row.get(4)?;
        let metadata: String = row.get(7)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        Ok(Campaign {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            brand_id: row.get(2)?,
            name: row.get(3)?,
            status: serde_json::from_value(serde_json::Value::String(status))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
            budget_limit_usd: row.get(5)?,
            current_cost_usd: row.get(6)?,
            metadata: serde_json::from_str(&metadata).unwrap_or_else(|_| serde_json::json!({})),
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn fetch(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<Campaign>, CampaignError> {
        let sql = format!("SELECT {COLUMNS} FROM campaigns WHERE id = ? AND owner_id = ?");
        Ok(conn
            .query_row(&sql, params![id, owner_id], Self::row_to_campaign)
            .optional()?)
    }

    fn fetch_existing(conn: &Connection, owner_id: &str, id: &str) -> Result<Campaign, CampaignError> {
        Self::fetch(conn, owner_id, id)?.ok_or_else(|| CampaignError::NotFound(id.to_string()))
    }

    fn set_status(
        conn: &Connection,
        campaign: Campaign,
        status: CampaignStatus,
    ) -> Result<Campaign, CampaignError> {
        let now = Utc::now();
        conn.execute(
            "UPDATE campaigns SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), now.to_rfc3339(), campaign.id],
        )?;
        Ok(Campaign {
            status,
            updated_at: now,
            ..campaign
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl CampaignStore for SqliteCampaignStore {
    fn create(&self, new: NewCampaign) -> Result<Campaign, CampaignError> {
        let conn = self.conn()?;
        let now = Utc::now();
        let campaign = Campaign {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: new.owner_id,
            brand_id: new.brand_id,
            name: new.name,
            status: CampaignStatus::Draft,
            budget_limit_usd: new.budget_limit_usd,
            current_cost_usd: 0.0,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            &format!("INSERT INTO campaigns ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                campaign.id,
                campaign.owner_id,
                campaign.brand_id,
                campaign.name,
                campaign.status.as_str(),
                campaign.budget_limit_usd,
                campaign.current_cost_usd,
                campaign.metadata.to_string(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        Ok(campaign)
    }

    fn get(&self, owner_id: &str, id: &str) -> Result<Option<Campaign>, CampaignError> {
        let conn = self.conn()?;
        Self::fetch(&conn, owner_id, id)
    }

    fn list(&self, filter: &CampaignFilter) -> Result<Vec<Campaign>, CampaignError> {
        let conn = self.conn()?;
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {COLUMNS} FROM campaigns {where_clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_campaign)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn count(&self, filter: &CampaignFilter) -> Result<i64, CampaignError> {
        let conn = self.conn()?;
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM campaigns {where_clause}");
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }

    fn list_all(&self, owner_id: &str) -> Result<Vec<Campaign>, CampaignError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {COLUMNS} FROM campaigns WHERE owner_id = ? ORDER BY updated_at DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id], Self::row_to_campaign)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn update(
        &self,
        owner_id: &str,
        id: &str,
        patch: CampaignPatch,
    ) -> Result<Campaign, CampaignError> {
        patch.validate().map_err(CampaignError::Validation)?;

        let conn = self.conn()?;
        let current = Self::fetch_existing(&conn, owner_id, id)?;
        if !current.status.is_mutable() {
            return Err(CampaignError::Immutable {
                id: id.to_string(),
                status: current.status,
            });
        }

        let updated = Campaign {
            name: patch
                .name
                .map(|n| n.trim().to_string())
                .unwrap_or(current.name.clone()),
            status: patch.status.unwrap_or(current.status),
            budget_limit_usd: patch.budget_limit_usd.unwrap_or(current.budget_limit_usd),
            metadata: patch.metadata.unwrap_or(current.metadata.clone()),
            updated_at: Utc::now(),
            ..current
        };

        conn.execute(
            "UPDATE campaigns SET name = ?, status = ?, budget_limit_usd = ?, metadata = ?, \
             updated_at = ? WHERE id = ? AND owner_id = ?",
            params![
                updated.name,
                updated.status.as_str(),
                updated.budget_limit_usd,
                updated.metadata.to_string(),
                updated.updated_at.to_rfc3339(),
                id,
                owner_id,
            ],
        )?;
        Ok(updated)
    }

    fn delete(&self, owner_id: &str, id: &str) -> Result<Campaign, CampaignError> {
        let conn = self.conn()?;
        let current = Self::fetch_existing(&conn, owner_id, id)?;
        if current.status == CampaignStatus::PendingDeletion {
            return Ok(current);
        }
        Self::set_status(&conn, current, CampaignStatus::PendingDeletion)
    }

    fn restore(&self, owner_id: &str, id: &str) -> Result<Campaign, CampaignError> {
        let conn = self.conn()?;
        let current = Self::fetch_existing(&conn, owner_id, id)?;
        if current.status.is_dashboard_visible() {
            return Err(CampaignError::NotRestorable {
                id: id.to_string(),
                status: current.status,
            });
        }
        Self::set_status(&conn, current, CampaignStatus::Draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_store() -> SqliteCampaignStore {
        SqliteCampaignStore::in_memory().unwrap()
    }

    fn new_campaign(owner_id: &str, name: &str) -> NewCampaign {
        NewCampaign {
            owner_id: owner_id.to_string(),
            brand_id: "brand-1".to_string(),
            name: name.to_string(),
            budget_limit_usd: 150.0,
            metadata: json!({"budget_tier": "medium"}),
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = create_test_store();
        let created = store.create(new_campaign("owner-1", "Launch")).unwrap();
        assert_eq!(created.status, CampaignStatus::Draft);
        assert_eq!(created.current_cost_usd, 0.0);

        let fetched = store.get("owner-1", &created.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Launch");
        assert_eq!(fetched.metadata["budget_tier"], "medium");
        assert!(store.get("owner-2", &created.id).unwrap().is_none());
    }

    #[test]
    fn test_list_filters_and_paging() {
        let store = create_test_store();
        for i in 0..5 {
            store.create(new_campaign("owner-1", &format!("C{i}"))).unwrap();
        }
        let mut other_brand = new_campaign("owner-1", "Other");
        other_brand.brand_id = "brand-2".to_string();
        store.create(other_brand).unwrap();
        store.create(new_campaign("owner-2", "Not mine")).unwrap();

        let filter = CampaignFilter::new("owner-1");
        assert_eq!(store.count(&filter).unwrap(), 6);
        assert_eq!(store.list(&filter.clone().with_limit(4)).unwrap().len(), 4);
        assert_eq!(
            store
                .list(&filter.clone().with_limit(4).with_offset(4))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(store.count(&filter.clone().with_brand("brand-2")).unwrap(), 1);
        assert_eq!(
            store
                .count(&filter.with_status(CampaignStatus::Active))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(CampaignFilter::new("o").with_limit(1000).limit, 100);
        assert_eq!(CampaignFilter::new("o").with_limit(0).limit, 1);
        assert_eq!(CampaignFilter::new("o").with_offset(-3).offset, 0);
    }

    #[test]
    fn test_update() {
        let store = create_test_store();
        let created = store.create(new_campaign("owner-1", "Launch")).unwrap();

        let updated = store
            .update(
                "owner-1",
                &created.id,
                CampaignPatch {
                    name: Some("Relaunch".to_string()),
                    status: Some(CampaignStatus::Active),
                    ..CampaignPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Relaunch");
        assert_eq!(updated.status, CampaignStatus::Active);
        assert_eq!(updated.budget_limit_usd, 150.0);

        let fetched = store.get("owner-1", &created.id).unwrap().unwrap();
        assert_eq!(fetched.status, CampaignStatus::Active);
    }

    #[test]
    fn test_update_rejects_empty_patch_and_foreign_owner() {
        let store = create_test_store();
        let created = store.create(new_campaign("owner-1", "Launch")).unwrap();

        assert!(matches!(
            store.update("owner-1", &created.id, CampaignPatch::default()),
            Err(CampaignError::Validation(_))
        ));

        let patch = CampaignPatch {
            name: Some("Hijack".to_string()),
            ..CampaignPatch::default()
        };
        assert!(matches!(
            store.update("owner-2", &created.id, patch),
            Err(CampaignError::NotFound(_))
        ));
    }

    #[test]
    fn test_soft_delete_freezes_and_restore_revives() {
        let store = create_test_store();
        let created = store.create(new_campaign("owner-1", "Launch")).unwrap();

        let deleted = store.delete("owner-1", &created.id).unwrap();
        assert_eq!(deleted.status, CampaignStatus::PendingDeletion);
        assert!(store.get("owner-1", &created.id).unwrap().is_some());

        let patch = CampaignPatch {
            name: Some("Sneaky".to_string()),
            ..CampaignPatch::default()
        };
        assert!(matches!(
            store.update("owner-1", &created.id, patch),
            Err(CampaignError::Immutable { .. })
        ));

        let restored = store.restore("owner-1", &created.id).unwrap();
        assert_eq!(restored.status, CampaignStatus::Draft);
        assert!(matches!(
            store.restore("owner-1", &created.id),
            Err(CampaignError::NotRestorable { .. })
        ));
    }

    #[test]
    fn test_list_all_orders_by_update() {
        let store = create_test_store();
        let first = store.create(new_campaign("owner-1", "First")).unwrap();
        store.create(new_campaign("owner-1", "Second")).unwrap();
        store
            .update(
                "owner-1",
                &first.id,
                CampaignPatch {
                    status: Some(CampaignStatus::Paused),
                    ..CampaignPatch::default()
                },
            )
            .unwrap();

        let all = store.list_all("owner-1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
    }
}
