use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use crate::validation::{check_length, FieldError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
    PendingDeletion,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
            Self::PendingDeletion => "pending_deletion",
        }
    }

    /// Archived and soft-deleted campaigns never show up in dashboard counts.
    pub fn is_dashboard_visible(&self) -> bool {
        !matches!(self, Self::Archived | Self::PendingDeletion)
    }

    /// Hidden campaigns are frozen until restored.
    pub fn is_mutable(&self) -> bool {
        self.is_dashboard_visible()
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTier {
    Low,
    #[default]
    Medium,
    High,
    Premium,
}

impl BudgetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Premium => "premium",
        }
    }

    pub fn limit_usd(&self) -> f64 {
        match self {
            Self::Low => 50.0,
            Self::Medium => 150.0,
            Self::High => 500.0,
            Self::Premium => 2000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub owner_id: String,
    pub brand_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub budget_limit_usd: f64,
    pub current_cost_usd: f64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCampaign {
    pub owner_id: String,
    pub brand_id: String,
    pub name: String,
    pub budget_limit_usd: f64,
    pub metadata: serde_json::Value,
}

/// Body of `POST /api/v1/campaigns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignInput {
    #[serde(alias = "campaign_name")]
    pub name: String,
    pub brand_id: String,
    #[serde(default)]
    pub budget_tier: BudgetTier,
    #[serde(default)]
    pub campaign_objective: Option<String>,
    #[serde(default)]
    pub target_demographic: Option<String>,
}

impl CreateCampaignInput {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_length(&mut errors, "name", &self.name, 1, 100);
        check_length(&mut errors, "brand_id", &self.brand_id, 1, 64);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn into_new(self, owner_id: &str) -> NewCampaign {
        NewCampaign {
            owner_id: owner_id.to_string(),
            brand_id: self.brand_id,
            name: self.name.trim().to_string(),
            budget_limit_usd: self.budget_tier.limit_usd(),
            metadata: json!({
                "budget_tier": self.budget_tier,
                "campaign_objective": self.campaign_objective,
                "target_demographic": self.target_demographic,
            }),
        }
    }
}

/// Partial update; at least one field must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignPatch {
    #[serde(default, alias = "campaign_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<CampaignStatus>,
    #[serde(default)]
    pub budget_limit_usd: Option<f64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl CampaignPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.status.is_none()
            && self.budget_limit_usd.is_none()
            && self.metadata.is_none()
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.is_empty() {
            errors.push(FieldError::new("body", "no fields to update"));
        }
        if let Some(name) = &self.name {
            check_length(&mut errors, "name", name, 1, 100);
        }
        if let Some(budget) = self.budget_limit_usd {
            if !budget.is_finite() || budget < 0.0 {
                errors.push(FieldError::new(
                    "budget_limit_usd",
                    "must be a non-negative number",
                ));
            }
        }
        if let Some(status) = self.status {
            if !status.is_dashboard_visible() {
                errors.push(FieldError::new(
                    "status",
                    "use delete to remove a campaign",
                ));
            }
        }
        if let Some(metadata) = &self.metadata {
            if !metadata.is_object() {
                errors.push(FieldError::new("metadata", "must be an object"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility() {
        assert!(CampaignStatus::Active.is_dashboard_visible());
        assert!(CampaignStatus::Completed.is_dashboard_visible());
        assert!(!CampaignStatus::Archived.is_dashboard_visible());
        assert!(!CampaignStatus::PendingDeletion.is_dashboard_visible());
        assert_eq!(
            serde_json::to_value(CampaignStatus::PendingDeletion).unwrap(),
            "pending_deletion"
        );
    }

    #[test]
    fn test_budget_tiers() {
        assert_eq!(BudgetTier::Low.limit_usd(), 50.0);
        assert_eq!(BudgetTier::default().limit_usd(), 150.0);
        assert_eq!(BudgetTier::High.limit_usd(), 500.0);
        assert_eq!(BudgetTier::Premium.limit_usd(), 2000.0);
    }

    #[test]
    fn test_create_input_accepts_legacy_name_field() {
        let input: CreateCampaignInput = serde_json::from_value(json!({
            "campaign_name": "Summer Drop",
            "brand_id": "brand-1",
            "budget_tier": "high",
            "campaign_objective": "awareness"
        }))
        .unwrap();
        assert!(input.validate().is_ok());

        let new = input.into_new("owner-1");
        assert_eq!(new.name, "Summer Drop");
        assert_eq!(new.budget_limit_usd, 500.0);
        assert_eq!(new.metadata["budget_tier"], "high");
        assert_eq!(new.metadata["campaign_objective"], "awareness");
        assert!(new.metadata["target_demographic"].is_null());
    }

    #[test]
    fn test_create_input_rejects_long_name() {
        let input = CreateCampaignInput {
            name: "x".repeat(101),
            brand_id: String::new(),
            budget_tier: BudgetTier::Medium,
            campaign_objective: None,
            target_demographic: None,
        };
        let errors = input.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "must be at most 100 characters");
        assert_eq!(errors[1].field, "brand_id");
    }

    #[test]
    fn test_patch_validation() {
        assert!(CampaignPatch::default().validate().is_err());

        let patch = CampaignPatch {
            status: Some(CampaignStatus::Paused),
            ..CampaignPatch::default()
        };
        assert!(patch.validate().is_ok());

        let patch = CampaignPatch {
            status: Some(CampaignStatus::PendingDeletion),
            budget_limit_usd: Some(-1.0),
            ..CampaignPatch::default()
        };
        let fields: Vec<String> = patch
            .validate()
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["budget_limit_usd", "status"]);
    }
}
