//! SQLite-backed pipeline store.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;

use super::{
    ContentRequest, NewContentRequest, NewRequestEvent, PipelineError, PipelineStore,
    RequestEvent, RequestFilter, RequestStatus, RequestTask, TaskStatus,
};

const REQUEST_COLUMNS: &str = "id, owner_id, brand_id, campaign_id, title, request_type, status, \
     prompt, duration_seconds, aspect_ratio, style_preset, shot_type, voice_id, \
     preferred_provider, provider_tier, auto_script, script_text, selected_kb_ids, \
     estimated_cost, estimated_time_seconds, actual_cost, thumbnail_url, output_url, \
     metadata, idempotency_key, created_at, updated_at";

const TASK_COLUMNS: &str = "id, request_id, agent_role, task_name, task_key, description, \
     status, sequence_order, depends_on, input_data, output_data, output_url, error_message, \
     error_code, retry_count, max_retries, started_at, completed_at, timeout_seconds, \
     estimated_duration_seconds, created_at";

const EVENT_COLUMNS: &str =
    "id, request_id, task_id, event_type, description, metadata, actor, created_at";

pub struct SqlitePipelineStore {
    conn: Mutex<Connection>,
}

impl SqlitePipelineStore {
    pub fn new(path: &Path) -> Result<Self, PipelineError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), PipelineError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS content_requests (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                brand_id TEXT NOT NULL,
                campaign_id TEXT,
                title TEXT NOT NULL,
                request_type TEXT NOT NULL,
                status TEXT NOT NULL,
                prompt TEXT NOT NULL,
                duration_seconds INTEGER,
                aspect_ratio TEXT NOT NULL,
                style_preset TEXT NOT NULL,
                shot_type TEXT NOT NULL,
                voice_id TEXT,
                preferred_provider TEXT,
                provider_tier TEXT NOT NULL,
                auto_script INTEGER NOT NULL,
                script_text TEXT,
                selected_kb_ids TEXT NOT NULL,
                estimated_cost REAL,
                estimated_time_seconds INTEGER,
                actual_cost REAL NOT NULL DEFAULT 0,
                thumbnail_url TEXT,
                output_url TEXT,
                metadata TEXT NOT NULL,
                idempotency_key TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_requests_owner ON content_requests(owner_id);
            CREATE INDEX IF NOT EXISTS idx_requests_campaign ON content_requests(campaign_id);
            CREATE INDEX IF NOT EXISTS idx_requests_status ON content_requests(status);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_requests_idempotency
                ON content_requests(owner_id, idempotency_key);

            CREATE TABLE IF NOT EXISTS request_tasks (
                id TEXT PRIMARY KEY,
                request_id TEXT NOT NULL,
                agent_role TEXT NOT NULL,
                task_name TEXT NOT NULL,
                task_key TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                sequence_order INTEGER NOT NULL,
                depends_on TEXT NOT NULL,
                input_data TEXT NOT NULL,
                output_data TEXT,
                output_url TEXT,
                error_message TEXT,
                error_code TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 0,
                started_at TEXT,
                completed_at TEXT,
                timeout_seconds INTEGER NOT NULL,
                estimated_duration_seconds INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_request ON request_tasks(request_id, sequence_order);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON request_tasks(status);

            CREATE TABLE IF NOT EXISTS request_events (
                id TEXT PRIMARY KEY,
                request_id TEXT NOT NULL,
                task_id TEXT,
                event_type TEXT NOT NULL,
                description TEXT NOT NULL,
                metadata TEXT NOT NULL,
                actor TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_request ON request_events(request_id, created_at);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PipelineError> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &RequestFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref owner_id) = filter.owner_id {
            conditions.push("owner_id = ?");
            params.push(Box::new(owner_id.clone()));
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }
        if let Some(ref campaign_id) = filter.campaign_id {
            conditions.push("campaign_id = ?");
            params.push(Box::new(campaign_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        (where_clause, params)
    }

    fn row_to_request(row: &rusqlite::Row) -> rusqlite::Result<ContentRequest> {
        Ok(ContentRequest {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            brand_id: row.get(2)?,
            campaign_id: row.get(3)?,
            title: row.get(4)?,
            request_type: enum_column(row, 5)?,
            status: enum_column(row, 6)?,
            prompt: row.get(7)?,
            duration_seconds: row.get(8)?,
            aspect_ratio: row.get(9)?,
            style_preset: row.get(10)?,
            shot_type: row.get(11)?,
            voice_id: row.get(12)?,
            preferred_provider: row.get(13)?,
            provider_tier: enum_column(row, 14)?,
            auto_script: row.get(15)?,
            script_text: row.get(16)?,
            selected_kb_ids: json_column(row, 17)?,
            estimated_cost: row.get(18)?,
            estimated_time_seconds: row
                .get::<_, Option<i64>>(19)?
                .map(|v| v.max(0) as u64),
            actual_cost: row.get(20)?,
            thumbnail_url: row.get(21)?,
            output_url: row.get(22)?,
            metadata: json_column(row, 23)?,
            idempotency_key: row.get(24)?,
            created_at: parse_timestamp(&row.get::<_, String>(25)?),
            updated_at: parse_timestamp(&row.get::<_, String>(26)?),
        })
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<RequestTask> {
        let output_data: Option<String> = row.get(10)?;
        Ok(RequestTask {
            id: row.get(0)?,
            request_id: row.get(1)?,
            agent_role: enum_column(row, 2)?,
            task_name: row.get(3)?,
            task_key: row.get(4)?,
            description: row.get(5)?,
            status: enum_column(row, 6)?,
            sequence_order: row.get(7)?,
            depends_on: json_column(row, 8)?,
            input_data: json_column(row, 9)?,
            output_data: output_data.and_then(|json| serde_json::from_str(&json).ok()),
            output_url: row.get(11)?,
            error_message: row.get(12)?,
            error_code: row.get(13)?,
            retry_count: row.get(14)?,
            max_retries: row.get(15)?,
            started_at: row.get::<_, Option<String>>(16)?.map(|s| parse_timestamp(&s)),
            completed_at: row.get::<_, Option<String>>(17)?.map(|s| parse_timestamp(&s)),
            timeout_seconds: row.get::<_, i64>(18)?.max(0) as u64,
            estimated_duration_seconds: row.get::<_, i64>(19)?.max(0) as u64,
            created_at: parse_timestamp(&row.get::<_, String>(20)?),
        })
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<RequestEvent> {
        Ok(RequestEvent {
            id: row.get(0)?,
            request_id: row.get(1)?,
            task_id: row.get(2)?,
            event_type: enum_column(row, 3)?,
            description: row.get(4)?,
            metadata: json_column(row, 5)?,
            actor: row.get(6)?,
            created_at: parse_timestamp(&row.get::<_, String>(7)?),
        })
    }

    fn fetch_request(
        conn: &Connection,
        sql_where: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<ContentRequest>, PipelineError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM content_requests WHERE {sql_where}");
        Ok(conn
            .query_row(&sql, params, Self::row_to_request)
            .optional()?)
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Enums are stored as their snake_case wire names.
fn enum_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_value(serde_json::Value::String(raw))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, PipelineError> {
    serde_json::to_string(value).map_err(|e| PipelineError::Database(e.to_string()))
}

fn wire_name<T: serde::Serialize>(value: &T) -> Result<String, PipelineError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        Ok(other) => Err(PipelineError::Database(format!(
            "expected a string enum, got {other}"
        ))),
        Err(e) => Err(PipelineError::Database(e.to_string())),
    }
}

impl PipelineStore for SqlitePipelineStore {
    fn create_request(&self, new: NewContentRequest) -> Result<ContentRequest, PipelineError> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let request = ContentRequest {
            id,
            owner_id: new.owner_id,
            brand_id: new.brand_id,
            campaign_id: new.campaign_id,
            title: new.title,
            request_type: new.request_type,
            status: RequestStatus::Intake,
            prompt: new.prompt,
            duration_seconds: new.duration_seconds,
            aspect_ratio: new.aspect_ratio,
            style_preset: new.style_preset,
            shot_type: new.shot_type,
            voice_id: new.voice_id,
            preferred_provider: new.preferred_provider,
            provider_tier: new.provider_tier,
            auto_script: new.auto_script,
            script_text: new.script_text,
            selected_kb_ids: new.selected_kb_ids,
            estimated_cost: new.estimated_cost,
            estimated_time_seconds: new.estimated_time_seconds,
            actual_cost: 0.0,
            thumbnail_url: None,
            output_url: None,
            metadata: new.metadata,
            idempotency_key: new.idempotency_key,
            created_at: now,
            updated_at: now,
        };

        let sql = format!(
            "INSERT INTO content_requests ({REQUEST_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, \
              ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)"
        );
        conn.execute(
            &sql,
            params![
                request.id,
                request.owner_id,
                request.brand_id,
                request.campaign_id,
                request.title,
                request.request_type.as_str(),
                request.status.as_str(),
                request.prompt,
                request.duration_seconds,
                request.aspect_ratio,
                request.style_preset,
                request.shot_type,
                request.voice_id,
                request.preferred_provider,
                wire_name(&request.provider_tier)?,
                request.auto_script,
                request.script_text,
                to_json(&request.selected_kb_ids)?,
                request.estimated_cost,
                request.estimated_time_seconds.map(|v| v as i64),
                request.actual_cost,
                request.thumbnail_url,
                request.output_url,
                to_json(&request.metadata)?,
                request.idempotency_key,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(request)
    }

    fn get_request(&self, owner_id: &str, id: &str) -> Result<Option<ContentRequest>, PipelineError> {
        let conn = self.conn()?;
        Self::fetch_request(&conn, "id = ?1 AND owner_id = ?2", &[&id, &owner_id])
    }

    fn get_request_unscoped(&self, id: &str) -> Result<Option<ContentRequest>, PipelineError> {
        let conn = self.conn()?;
        Self::fetch_request(&conn, "id = ?1", &[&id])
    }

    fn find_by_idempotency_key(
        &self,
        owner_id: &str,
        key: &str,
    ) -> Result<Option<ContentRequest>, PipelineError> {
        let conn = self.conn()?;
        Self::fetch_request(
            &conn,
            "owner_id = ?1 AND idempotency_key = ?2",
            &[&owner_id, &key],
        )
    }

    fn clear_idempotency_key(&self, id: &str) -> Result<(), PipelineError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE content_requests SET idempotency_key = NULL, updated_at = ? WHERE id = ?",
            params![Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(PipelineError::RequestNotFound(id.to_string()));
        }
        Ok(())
    }

    fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<ContentRequest>, PipelineError> {
        let conn = self.conn()?;
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM content_requests {where_clause} \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_request)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn count_requests(&self, filter: &RequestFilter) -> Result<i64, PipelineError> {
        let conn = self.conn()?;
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM content_requests {where_clause}");
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }

    fn count_by_status(&self, owner_id: &str) -> Result<BTreeMap<RequestStatus, i64>, PipelineError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM content_requests WHERE owner_id = ? GROUP BY status",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok((enum_column::<RequestStatus>(row, 0)?, row.get::<_, i64>(1)?))
        })?;
        Ok(rows.collect::<Result<BTreeMap<_, _>, _>>()?)
    }

    fn update_status(
        &self,
        id: &str,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<ContentRequest, PipelineError> {
        let conn = self.conn()?;
        let now = Utc::now();
        let changed = conn.execute(
            "UPDATE content_requests SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            params![to.as_str(), now.to_rfc3339(), id, from.as_str()],
        )?;
        let current = Self::fetch_request(&conn, "id = ?1", &[&id])?
            .ok_or_else(|| PipelineError::RequestNotFound(id.to_string()))?;
        if changed == 0 {
            return Err(PipelineError::Conflict {
                entity: "request",
                id: id.to_string(),
                expected: from.to_string(),
            });
        }
        Ok(current)
    }

    fn update_title(
        &self,
        owner_id: &str,
        id: &str,
        title: &str,
    ) -> Result<ContentRequest, PipelineError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE content_requests SET title = ?, updated_at = ? WHERE id = ? AND owner_id = ?",
            params![title.trim(), Utc::now().to_rfc3339(), id, owner_id],
        )?;
        if changed == 0 {
            return Err(PipelineError::RequestNotFound(id.to_string()));
        }
        Self::fetch_request(&conn, "id = ?1", &[&id])?
            .ok_or_else(|| PipelineError::RequestNotFound(id.to_string()))
    }

    fn record_output(&self, id: &str, output_url: &str) -> Result<(), PipelineError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE content_requests SET output_url = ?, updated_at = ? WHERE id = ?",
            params![output_url, Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(PipelineError::RequestNotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete_request(&self, owner_id: &str, id: &str) -> Result<ContentRequest, PipelineError> {
        let mut conn = self.conn()?;
        let request = Self::fetch_request(&conn, "id = ?1 AND owner_id = ?2", &[&id, &owner_id])?
            .ok_or_else(|| PipelineError::RequestNotFound(id.to_string()))?;

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM request_events WHERE request_id = ?", params![id])?;
        tx.execute("DELETE FROM request_tasks WHERE request_id = ?", params![id])?;
        tx.execute("DELETE FROM content_requests WHERE id = ?", params![id])?;
        tx.commit()?;

        Ok(request)
    }

    fn insert_tasks(&self, tasks: &[RequestTask]) -> Result<(), PipelineError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let sql = format!(
                "INSERT INTO request_tasks ({TASK_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
                  ?18, ?19, ?20, ?21)"
            );
            let mut stmt = tx.prepare(&sql)?;
            for task in tasks {
                stmt.execute(params![
                    task.id,
                    task.request_id,
                    task.agent_role.as_str(),
                    task.task_name,
                    task.task_key,
                    task.description,
                    task.status.as_str(),
                    task.sequence_order,
                    to_json(&task.depends_on)?,
                    to_json(&task.input_data)?,
                    task.output_data.as_ref().map(to_json).transpose()?,
                    task.output_url,
                    task.error_message,
                    task.error_code,
                    task.retry_count,
                    task.max_retries,
                    task.started_at.map(|t| t.to_rfc3339()),
                    task.completed_at.map(|t| t.to_rfc3339()),
                    task.timeout_seconds as i64,
                    task.estimated_duration_seconds as i64,
                    task.created_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn list_tasks(&self, request_id: &str) -> Result<Vec<RequestTask>, PipelineError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM request_tasks WHERE request_id = ? ORDER BY sequence_order ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![request_id], Self::row_to_task)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get_task(&self, task_id: &str) -> Result<Option<RequestTask>, PipelineError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {TASK_COLUMNS} FROM request_tasks WHERE id = ?");
        Ok(conn
            .query_row(&sql, params![task_id], Self::row_to_task)
            .optional()?)
    }

    fn save_task(&self, task: &RequestTask, expected: TaskStatus) -> Result<(), PipelineError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE request_tasks SET status = ?, output_data = ?, output_url = ?, \
             error_message = ?, error_code = ?, retry_count = ?, started_at = ?, completed_at = ? \
             WHERE id = ? AND status = ?",
            params![
                task.status.as_str(),
                task.output_data.as_ref().map(to_json).transpose()?,
                task.output_url,
                task.error_message,
                task.error_code,
                task.retry_count,
                task.started_at.map(|t| t.to_rfc3339()),
                task.completed_at.map(|t| t.to_rfc3339()),
                task.id,
                expected.as_str(),
            ],
        )?;
        if changed == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM request_tasks WHERE id = ?)",
                params![task.id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(PipelineError::TaskNotFound(task.id.clone()));
            }
            return Err(PipelineError::Conflict {
                entity: "task",
                id: task.id.clone(),
                expected: expected.to_string(),
            });
        }
        Ok(())
    }

    fn skip_open_tasks(&self, request_id: &str) -> Result<usize, PipelineError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "UPDATE request_tasks SET status = ? WHERE request_id = ? AND status IN (?, ?)",
            params![
                TaskStatus::Skipped.as_str(),
                request_id,
                TaskStatus::Pending.as_str(),
                TaskStatus::InProgress.as_str(),
            ],
        )?)
    }

    fn in_progress_tasks_started_before(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<RequestTask>, PipelineError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM request_tasks \
             WHERE status = ? AND started_at IS NOT NULL AND started_at < ? \
             ORDER BY started_at ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![TaskStatus::InProgress.as_str(), before.to_rfc3339()],
            Self::row_to_task,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn append_event(&self, event: NewRequestEvent) -> Result<RequestEvent, PipelineError> {
        let conn = self.conn()?;
        let record = RequestEvent {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: event.request_id,
            task_id: event.task_id,
            event_type: event.event_type,
            description: event.description,
            metadata: event.metadata,
            actor: event.actor,
            created_at: Utc::now(),
        };

        let sql = format!(
            "INSERT INTO request_events ({EVENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        );
        conn.execute(
            &sql,
            params![
                record.id,
                record.request_id,
                record.task_id,
                wire_name(&record.event_type)?,
                record.description,
                to_json(&record.metadata)?,
                record.actor,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(record)
    }

    fn list_events(
        &self,
        request_id: &str,
        limit: i64,
        offset: i64,
        newest_first: bool,
    ) -> Result<Vec<RequestEvent>, PipelineError> {
        let conn = self.conn()?;
        let order = if newest_first { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM request_events WHERE request_id = ? \
             ORDER BY created_at {order}, rowid {order} LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![request_id, limit, offset], Self::row_to_event)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::task_factory::build_tasks;
    use crate::pipeline::{EventType, RequestType};
    use crate::testing::fixtures::new_content_request;

    fn create_test_store() -> SqlitePipelineStore {
        SqlitePipelineStore::in_memory().unwrap()
    }

    #[test]
    fn test_create_and_get_request() {
        let store = create_test_store();
        let created = store
            .create_request(new_content_request("owner-1", RequestType::VideoWithVo))
            .unwrap();

        assert_eq!(created.status, RequestStatus::Intake);
        let fetched = store.get_request("owner-1", &created.id).unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.request_type, RequestType::VideoWithVo);
        assert_eq!(fetched.selected_kb_ids, created.selected_kb_ids);
        assert_eq!(fetched.metadata, created.metadata);
        assert_eq!(fetched.estimated_time_seconds, created.estimated_time_seconds);
    }

    #[test]
    fn test_get_request_is_owner_scoped() {
        let store = create_test_store();
        let created = store
            .create_request(new_content_request("owner-1", RequestType::Image))
            .unwrap();

        assert!(store.get_request("owner-2", &created.id).unwrap().is_none());
        assert!(store.get_request_unscoped(&created.id).unwrap().is_some());
    }

    #[test]
    fn test_find_by_idempotency_key() {
        let store = create_test_store();
        let mut new = new_content_request("owner-1", RequestType::Image);
        new.idempotency_key = Some("key-1".to_string());
        let created = store.create_request(new).unwrap();

        let found = store.find_by_idempotency_key("owner-1", "key-1").unwrap();
        assert_eq!(found.map(|r| r.id), Some(created.id));
        assert!(store.find_by_idempotency_key("owner-2", "key-1").unwrap().is_none());
    }

    #[test]
    fn test_list_and_count_with_filters() {
        let store = create_test_store();
        for _ in 0..3 {
            store
                .create_request(new_content_request("owner-1", RequestType::Image))
                .unwrap();
        }
        let mut in_campaign = new_content_request("owner-1", RequestType::Image);
        in_campaign.campaign_id = Some("camp-1".to_string());
        let in_campaign = store.create_request(in_campaign).unwrap();
        store
            .create_request(new_content_request("owner-2", RequestType::Image))
            .unwrap();
        store
            .update_status(&in_campaign.id, RequestStatus::Intake, RequestStatus::Draft)
            .unwrap();

        let owner = RequestFilter::for_owner("owner-1");
        assert_eq!(store.count_requests(&owner).unwrap(), 4);
        assert_eq!(store.list_requests(&owner.clone().with_limit(2)).unwrap().len(), 2);
        assert_eq!(
            store
                .list_requests(&owner.clone().with_campaign("camp-1"))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store
                .count_requests(&owner.with_status(RequestStatus::Draft))
                .unwrap(),
            1
        );

        let by_status = store.count_by_status("owner-1").unwrap();
        assert_eq!(by_status.get(&RequestStatus::Intake), Some(&3));
        assert_eq!(by_status.get(&RequestStatus::Draft), Some(&1));
    }

    #[test]
    fn test_update_status_missing_request() {
        let store = create_test_store();
        let result = store.update_status("missing", RequestStatus::Intake, RequestStatus::Draft);
        assert!(matches!(result, Err(PipelineError::RequestNotFound(_))));
    }

    #[test]
    fn test_update_status_rejects_stale_source() {
        let store = create_test_store();
        let request = store
            .create_request(new_content_request("owner-1", RequestType::Image))
            .unwrap();
        store
            .update_status(&request.id, RequestStatus::Intake, RequestStatus::Cancelled)
            .unwrap();

        let stale = store.update_status(&request.id, RequestStatus::Intake, RequestStatus::Draft);
        assert!(matches!(
            stale,
            Err(PipelineError::Conflict { entity: "request", .. })
        ));
        let fetched = store.get_request_unscoped(&request.id).unwrap().unwrap();
        assert_eq!(fetched.status, RequestStatus::Cancelled);
    }

    #[test]
    fn test_clear_idempotency_key_frees_the_key() {
        let store = create_test_store();
        let mut new = new_content_request("owner-1", RequestType::Image);
        new.idempotency_key = Some("key-1".to_string());
        let first = store.create_request(new.clone()).unwrap();

        assert!(store.create_request(new.clone()).is_err());
        store.clear_idempotency_key(&first.id).unwrap();
        assert!(store.find_by_idempotency_key("owner-1", "key-1").unwrap().is_none());

        let second = store.create_request(new).unwrap();
        assert_ne!(second.id, first.id);
        assert!(matches!(
            store.clear_idempotency_key("missing"),
            Err(PipelineError::RequestNotFound(_))
        ));
    }

    #[test]
    fn test_update_title_and_output() {
        let store = create_test_store();
        let created = store
            .create_request(new_content_request("owner-1", RequestType::Image))
            .unwrap();

        assert!(store.update_title("owner-2", &created.id, "Nope").is_err());
        let renamed = store.update_title("owner-1", &created.id, " Renamed ").unwrap();
        assert_eq!(renamed.title, "Renamed");

        store
            .record_output(&created.id, "https://cdn.example.com/out.png")
            .unwrap();
        let fetched = store.get_request_unscoped(&created.id).unwrap().unwrap();
        assert_eq!(
            fetched.output_url.as_deref(),
            Some("https://cdn.example.com/out.png")
        );
    }

    #[test]
    fn test_tasks_roundtrip_and_save() {
        let store = create_test_store();
        let request = store
            .create_request(new_content_request("owner-1", RequestType::VideoWithVo))
            .unwrap();
        let tasks = build_tasks(&request, 3);
        store.insert_tasks(&tasks).unwrap();

        let listed = store.list_tasks(&request.id).unwrap();
        assert_eq!(listed, tasks);

        let mut task = listed[0].clone();
        task.status = TaskStatus::Completed;
        task.output_data = Some(serde_json::json!({"ok": true}));
        task.completed_at = Some(Utc::now());
        store.save_task(&task, TaskStatus::Pending).unwrap();

        let fetched = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        assert_eq!(fetched.output_data, task.output_data);
        assert!(fetched.completed_at.is_some());
    }

    #[test]
    fn test_save_task_rejects_moved_task() {
        let store = create_test_store();
        let request = store
            .create_request(new_content_request("owner-1", RequestType::Image))
            .unwrap();
        let mut tasks = build_tasks(&request, 3);
        tasks[0].status = TaskStatus::InProgress;
        store.insert_tasks(&tasks).unwrap();
        store.skip_open_tasks(&request.id).unwrap();

        let mut late = tasks[0].clone();
        late.status = TaskStatus::Completed;
        let result = store.save_task(&late, TaskStatus::InProgress);
        assert!(matches!(
            result,
            Err(PipelineError::Conflict { entity: "task", .. })
        ));
        assert_eq!(
            store.get_task(&late.id).unwrap().unwrap().status,
            TaskStatus::Skipped
        );

        late.id = "missing".to_string();
        assert!(matches!(
            store.save_task(&late, TaskStatus::InProgress),
            Err(PipelineError::TaskNotFound(_))
        ));
    }

    #[test]
    fn test_skip_open_tasks() {
        let store = create_test_store();
        let request = store
            .create_request(new_content_request("owner-1", RequestType::Image))
            .unwrap();
        let mut tasks = build_tasks(&request, 3);
        tasks[0].status = TaskStatus::Completed;
        tasks[1].status = TaskStatus::InProgress;
        store.insert_tasks(&tasks).unwrap();

        assert_eq!(store.skip_open_tasks(&request.id).unwrap(), 3);
        let statuses: Vec<TaskStatus> = store
            .list_tasks(&request.id)
            .unwrap()
            .iter()
            .map(|t| t.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                TaskStatus::Completed,
                TaskStatus::Skipped,
                TaskStatus::Skipped,
                TaskStatus::Skipped
            ]
        );
    }

    #[test]
    fn test_in_progress_tasks_started_before() {
        let store = create_test_store();
        let request = store
            .create_request(new_content_request("owner-1", RequestType::Image))
            .unwrap();
        let mut tasks = build_tasks(&request, 3);
        tasks[0].status = TaskStatus::InProgress;
        tasks[0].started_at = Some(Utc::now() - chrono::Duration::hours(1));
        tasks[1].status = TaskStatus::InProgress;
        tasks[1].started_at = Some(Utc::now() + chrono::Duration::hours(1));
        store.insert_tasks(&tasks).unwrap();

        let stale = store.in_progress_tasks_started_before(Utc::now()).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, tasks[0].id);
    }

    #[test]
    fn test_events_ordering_and_paging() {
        let store = create_test_store();
        for i in 0..3 {
            store
                .append_event(NewRequestEvent::new(
                    "req-1",
                    EventType::AgentLog,
                    format!("event {i}"),
                ))
                .unwrap();
        }

        let oldest_first = store.list_events("req-1", 10, 0, false).unwrap();
        assert_eq!(oldest_first[0].description, "event 0");
        assert_eq!(oldest_first[0].event_type, EventType::AgentLog);

        let newest_first = store.list_events("req-1", 2, 0, true).unwrap();
        assert_eq!(newest_first.len(), 2);
        assert_eq!(newest_first[0].description, "event 2");

        let page = store.list_events("req-1", 2, 2, true).unwrap();
        assert_eq!(page[0].description, "event 0");
    }

    #[test]
    fn test_delete_request_cascades() {
        let store = create_test_store();
        let request = store
            .create_request(new_content_request("owner-1", RequestType::Image))
            .unwrap();
        store.insert_tasks(&build_tasks(&request, 3)).unwrap();
        store
            .append_event(NewRequestEvent::new(&request.id, EventType::Created, "Created"))
            .unwrap();

        assert!(matches!(
            store.delete_request("owner-2", &request.id),
            Err(PipelineError::RequestNotFound(_))
        ));
        store.delete_request("owner-1", &request.id).unwrap();

        assert!(store.get_request_unscoped(&request.id).unwrap().is_none());
        assert!(store.list_tasks(&request.id).unwrap().is_empty());
        assert!(store.list_events(&request.id, 10, 0, false).unwrap().is_empty());
    }
}
