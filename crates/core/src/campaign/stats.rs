//! Dashboard aggregates over campaigns and their content requests.

use serde::Serialize;
use std::collections::BTreeMap;

use super::{Campaign, CampaignStatus};
use crate::pipeline::{status_machine, ContentRequest, RequestStatus};

const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    /// Campaigns that are neither archived nor pending deletion.
    pub total_campaigns: usize,
    pub active_campaigns: usize,
    pub campaigns_by_status: BTreeMap<CampaignStatus, usize>,
    pub recent_campaigns: Vec<Campaign>,
    pub total_requests: i64,
    pub requests_by_status: BTreeMap<RequestStatus, i64>,
}

impl DashboardStats {
    /// `campaigns` must be ordered most recently updated first.
    pub fn compute(campaigns: &[Campaign], requests_by_status: BTreeMap<RequestStatus, i64>) -> Self {
        let visible: Vec<&Campaign> = campaigns
            .iter()
            .filter(|c| c.status.is_dashboard_visible())
            .collect();

        let mut by_status = BTreeMap::new();
        for campaign in &visible {
            *by_status.entry(campaign.status).or_insert(0) += 1;
        }

        let active = visible
            .iter()
            .filter(|c| !matches!(c.status, CampaignStatus::Draft | CampaignStatus::Completed))
            .count();

        Self {
            total_campaigns: visible.len(),
            active_campaigns: active,
            campaigns_by_status: by_status,
            recent_campaigns: visible
                .into_iter()
                .take(RECENT_LIMIT)
                .cloned()
                .collect(),
            total_requests: requests_by_status.values().sum(),
            requests_by_status,
        }
    }
}

/// Rollup of a campaign's content requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignProgress {
    pub campaign_id: String,
    pub total_requests: usize,
    pub published: usize,
    pub in_flight: usize,
    pub cancelled: usize,
    pub by_status: BTreeMap<RequestStatus, usize>,
    /// Mean status completion of non-cancelled requests.
    pub completion_percentage: u8,
    pub estimated_cost: f64,
}

pub fn campaign_progress(campaign_id: &str, requests: &[ContentRequest]) -> CampaignProgress {
    let mut by_status = BTreeMap::new();
    for request in requests {
        *by_status.entry(request.status).or_insert(0) += 1;
    }

    let live: Vec<&ContentRequest> = requests
        .iter()
        .filter(|r| r.status != RequestStatus::Cancelled)
        .collect();
    let completion = if live.is_empty() {
        0
    } else {
        let sum: u32 = live
            .iter()
            .map(|r| u32::from(status_machine::completion_percentage(r.status)))
            .sum();
        (f64::from(sum) / live.len() as f64).round() as u8
    };

    CampaignProgress {
        campaign_id: campaign_id.to_string(),
        total_requests: requests.len(),
        published: by_status.get(&RequestStatus::Published).copied().unwrap_or(0),
        in_flight: live.iter().filter(|r| !r.status.is_terminal()).count(),
        cancelled: by_status.get(&RequestStatus::Cancelled).copied().unwrap_or(0),
        by_status,
        completion_percentage: completion,
        estimated_cost: live.iter().filter_map(|r| r.estimated_cost).sum(),
    }
}
