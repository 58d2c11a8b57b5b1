//! Brands and the knowledge bases that feed content generation.

mod sqlite_store;
mod types;

pub use sqlite_store::SqliteBrandStore;
pub use types::*;
