//! Campaigns: owner-scoped marketing initiatives grouping content requests.

mod sqlite_store;
mod stats;
mod store;
mod types;

pub use sqlite_store::SqliteCampaignStore;
pub use stats::{campaign_progress, CampaignProgress, DashboardStats};
pub use store::{CampaignError, CampaignFilter, CampaignStore, MAX_PAGE_SIZE};
pub use types::*;
