//! SQLite-backed brand and knowledge-base store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    Brand, BrandError, BrandStore, CreateBrandInput, CreateKnowledgeBaseInput, KnowledgeBase,
};

pub struct SqliteBrandStore {
    conn: Mutex<Connection>,
}

impl SqliteBrandStore {
    pub fn new(path: &Path) -> Result<Self, BrandError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, BrandError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), BrandError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS brands (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_brands_owner ON brands(owner_id);

            CREATE TABLE IF NOT EXISTS knowledge_bases (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                brand_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_kbs_owner_brand ON knowledge_bases(owner_id, brand_id);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, BrandError> {
        self.conn
            .lock()
            .map_err(|_| BrandError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_brand(row: &rusqlite::Row) -> rusqlite::Result<Brand> {
        Ok(Brand {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            created_at: parse_timestamp(&row.get::<_, String>(4)?),
        })
    }

    fn row_to_knowledge_base(row: &rusqlite::Row) -> rusqlite::Result<KnowledgeBase> {
        Ok(KnowledgeBase {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            brand_id: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
            created_at: parse_timestamp(&row.get::<_, String>(5)?),
        })
    }

    fn fetch_brand(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<Brand>, BrandError> {
        Ok(conn
            .query_row(
                "SELECT id, owner_id, name, description, created_at FROM brands \
                 WHERE id = ? AND owner_id = ?",
                params![id, owner_id],
                Self::row_to_brand,
            )
            .optional()?)
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn clean(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

impl BrandStore for SqliteBrandStore {
    fn create_brand(&self, owner_id: &str, input: CreateBrandInput) -> Result<Brand, BrandError> {
        let conn = self.conn()?;
        let brand = Brand {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: input.name.trim().to_string(),
            description: clean(input.description),
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO brands (id, owner_id, name, description, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                brand.id,
                brand.owner_id,
                brand.name,
                brand.description,
                brand.created_at.to_rfc3339()
            ],
        )?;
        Ok(brand)
    }

    fn get_brand(&self, owner_id: &str, id: &str) -> Result<Option<Brand>, BrandError> {
        let conn = self.conn()?;
        Self::fetch_brand(&conn, owner_id, id)
    }

    fn list_brands(&self, owner_id: &str) -> Result<Vec<Brand>, BrandError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, name, description, created_at FROM brands \
             WHERE owner_id = ? ORDER BY name COLLATE NOCASE ASC",
        )?;
        let rows = stmt.query_map(params![owner_id], Self::row_to_brand)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn create_knowledge_base(
        &self,
        owner_id: &str,
        input: CreateKnowledgeBaseInput,
    ) -> Result<KnowledgeBase, BrandError> {
        let conn = self.conn()?;
        if Self::fetch_brand(&conn, owner_id, &input.brand_id)?.is_none() {
            return Err(BrandError::BrandNotFound(input.brand_id));
        }

        let kb = KnowledgeBase {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            brand_id: input.brand_id,
            name: input.name.trim().to_string(),
            description: clean(input.description),
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO knowledge_bases (id, owner_id, brand_id, name, description, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                kb.id,
                kb.owner_id,
                kb.brand_id,
                kb.name,
                kb.description,
                kb.created_at.to_rfc3339()
            ],
        )?;
        Ok(kb)
    }

    fn get_knowledge_base(
        &self,
        owner_id: &str,
        id: &str,
    ) -> Result<Option<KnowledgeBase>, BrandError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, owner_id, brand_id, name, description, created_at FROM knowledge_bases \
                 WHERE id = ? AND owner_id = ?",
                params![id, owner_id],
                Self::row_to_knowledge_base,
            )
            .optional()?)
    }

    fn list_knowledge_bases(
        &self,
        owner_id: &str,
        brand_id: Option<&str>,
    ) -> Result<Vec<KnowledgeBase>, BrandError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, brand_id, name, description, created_at FROM knowledge_bases \
             WHERE owner_id = ?1 AND (?2 IS NULL OR brand_id = ?2) ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![owner_id, brand_id], Self::row_to_knowledge_base)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteBrandStore {
        SqliteBrandStore::in_memory().unwrap()
    }

    fn brand(store: &SqliteBrandStore, owner_id: &str, name: &str) -> Brand {
        store
            .create_brand(
                owner_id,
                CreateBrandInput {
                    name: name.to_string(),
                    description: Some("  ".to_string()),
                },
            )
            .unwrap()
    }

    fn kb_input(brand_id: &str, name: &str) -> CreateKnowledgeBaseInput {
        CreateKnowledgeBaseInput {
            brand_id: brand_id.to_string(),
            name: name.to_string(),
            description: Some("Tone of voice".to_string()),
        }
    }

    #[test]
    fn test_brands_are_owner_scoped() {
        let store = create_test_store();
        let acme = brand(&store, "owner-1", "acme");
        brand(&store, "owner-1", "Beta");
        brand(&store, "owner-2", "Gamma");

        assert!(acme.description.is_none());
        let names: Vec<String> = store
            .list_brands("owner-1")
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["acme", "Beta"]);
        assert!(store.get_brand("owner-2", &acme.id).unwrap().is_none());
        assert!(store.get_brand("owner-1", &acme.id).unwrap().is_some());
    }

    #[test]
    fn test_knowledge_base_requires_owned_brand() {
        let store = create_test_store();
        let theirs = brand(&store, "owner-2", "Theirs");

        let result = store.create_knowledge_base("owner-1", kb_input(&theirs.id, "Guide"));
        assert!(matches!(result, Err(BrandError::BrandNotFound(_))));
    }

    #[test]
    fn test_knowledge_bases_filter_by_brand() {
        let store = create_test_store();
        let a = brand(&store, "owner-1", "A");
        let b = brand(&store, "owner-1", "B");
        let kb = store
            .create_knowledge_base("owner-1", kb_input(&a.id, "Guide"))
            .unwrap();
        store
            .create_knowledge_base("owner-1", kb_input(&b.id, "Facts"))
            .unwrap();

        assert_eq!(store.list_knowledge_bases("owner-1", None).unwrap().len(), 2);
        let for_a = store.list_knowledge_bases("owner-1", Some(&a.id)).unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].id, kb.id);
        assert!(store.list_knowledge_bases("owner-2", None).unwrap().is_empty());

        assert!(store.get_knowledge_base("owner-1", &kb.id).unwrap().is_some());
        assert!(store.get_knowledge_base("owner-2", &kb.id).unwrap().is_none());
    }
}
