use thiserror::Error;

use super::{Campaign, CampaignPatch, CampaignStatus, NewCampaign};
use crate::validation::FieldError;

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Campaign not found: {0}")]
    NotFound(String),

    /// Archived or soft-deleted campaigns cannot be edited.
    #[error("Campaign {id} is {status} and cannot be modified")]
    Immutable { id: String, status: CampaignStatus },

    #[error("Campaign {id} is {status} and cannot be restored")]
    NotRestorable { id: String, status: CampaignStatus },

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for CampaignError {
    fn from(e: rusqlite::Error) -> Self {
        CampaignError::Database(e.to_string())
    }
}

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct CampaignFilter {
    pub owner_id: String,
    pub status: Option<CampaignStatus>,
    pub brand_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl CampaignFilter {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            status: None,
            brand_id: None,
            limit: 20,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: CampaignStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_brand(mut self, brand_id: impl Into<String>) -> Self {
        self.brand_id = Some(brand_id.into());
        self
    }

    /// Clamped to `1..=MAX_PAGE_SIZE`.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset.max(0);
        self
    }
}

/// Owner-scoped campaign storage.
pub trait CampaignStore: Send + Sync {
    fn create(&self, new: NewCampaign) -> Result<Campaign, CampaignError>;

    fn get(&self, owner_id: &str, id: &str) -> Result<Option<Campaign>, CampaignError>;

    fn list(&self, filter: &CampaignFilter) -> Result<Vec<Campaign>, CampaignError>;

    fn count(&self, filter: &CampaignFilter) -> Result<i64, CampaignError>;

    /// Every campaign of an owner, most recently updated first.
    fn list_all(&self, owner_id: &str) -> Result<Vec<Campaign>, CampaignError>;

    fn update(&self, owner_id: &str, id: &str, patch: CampaignPatch)
        -> Result<Campaign, CampaignError>;

    /// Soft delete: the campaign moves to `pending_deletion`.
    fn delete(&self, owner_id: &str, id: &str) -> Result<Campaign, CampaignError>;

    /// Bring an archived or soft-deleted campaign back as a draft.
    fn restore(&self, owner_id: &str, id: &str) -> Result<Campaign, CampaignError>;
}
