//! Content requests and the staged pipeline they move through.
//!
//! A request walks intake → draft → production → qa → published, with
//! rollbacks and cancellation along the way. Each request type expands into
//! a fixed set of agent tasks whose completion gates the forward moves.

pub mod estimator;
pub mod idempotency;
pub mod progress;
mod sqlite_store;
pub mod status_machine;
mod store;
pub mod task_factory;
mod types;

pub use estimator::{estimate, estimate_request, CostEstimate, EstimateKind, EstimateParams};
pub use idempotency::idempotency_key;
pub use progress::{compute_progress, ProgressInfo, TaskProgress};
pub use sqlite_store::SqlitePipelineStore;
pub use status_machine::{AdvanceCheck, Stage, TransitionError};
pub use store::{PipelineError, PipelineStore, RequestFilter};
pub use task_factory::{StatusSummary, TaskTemplate};
pub use types::*;
