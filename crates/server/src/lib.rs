//! HTTP surface of the Reelforge content backend.

pub mod api;
pub mod metrics;
pub mod state;
