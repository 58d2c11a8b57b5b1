use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::{check_length, FieldError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brand {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reference material (guidelines, tone, product facts) attached to a brand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub owner_id: String,
    pub brand_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBrandInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateKnowledgeBaseInput {
    pub brand_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn finish(errors: Vec<FieldError>) -> Result<(), Vec<FieldError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

impl CreateBrandInput {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_length(&mut errors, "name", &self.name, 1, 100);
        if let Some(description) = &self.description {
            check_length(&mut errors, "description", description, 0, 2000);
        }
        finish(errors)
    }
}

impl CreateKnowledgeBaseInput {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_length(&mut errors, "brand_id", &self.brand_id, 1, 64);
        check_length(&mut errors, "name", &self.name, 1, 100);
        if let Some(description) = &self.description {
            check_length(&mut errors, "description", description, 0, 2000);
        }
        finish(errors)
    }
}

#[derive(Debug, Error)]
pub enum BrandError {
    #[error("Brand not found: {0}")]
    BrandNotFound(String),

    #[error("Knowledge base not found: {0}")]
    KnowledgeBaseNotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for BrandError {
    fn from(e: rusqlite::Error) -> Self {
        BrandError::Database(e.to_string())
    }
}

/// Owner-scoped storage for brands and their knowledge bases.
pub trait BrandStore: Send + Sync {
    fn create_brand(&self, owner_id: &str, input: CreateBrandInput) -> Result<Brand, BrandError>;

    fn get_brand(&self, owner_id: &str, id: &str) -> Result<Option<Brand>, BrandError>;

    fn list_brands(&self, owner_id: &str) -> Result<Vec<Brand>, BrandError>;

    /// Fails with `BrandNotFound` when the brand is not the caller's.
    fn create_knowledge_base(
        &self,
        owner_id: &str,
        input: CreateKnowledgeBaseInput,
    ) -> Result<KnowledgeBase, BrandError>;

    fn get_knowledge_base(&self, owner_id: &str, id: &str)
        -> Result<Option<KnowledgeBase>, BrandError>;

    fn list_knowledge_bases(
        &self,
        owner_id: &str,
        brand_id: Option<&str>,
    ) -> Result<Vec<KnowledgeBase>, BrandError>;
}
