//! Campaign snapshots as published by the campaign registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{CampaignId, UserId};

/// Campaign lifecycle status.
///
/// Distinct from [`crate::JobState`], which describes the server-side send job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery counters reported by the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryCounters {
    pub total_delivered: u64,
    pub total_opened: u64,
    pub total_clicked: u64,
}

/// A point-in-time campaign snapshot.
///
/// The monitor never persists or mutates these; it only reads them and
/// requests transitions from the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub subject: String,
    pub status: CampaignStatus,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counters: DeliveryCounters,
    pub user_id: UserId,
}

impl Campaign {
    pub fn is_sending(&self) -> bool {
        self.status == CampaignStatus::Sending
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Check the timestamp invariants:
    /// - `scheduled_for` is set iff status is `scheduled`
    /// - `sent_at` is set iff status is `completed`
    pub fn validate(&self) -> DomainResult<()> {
        let scheduled = self.status == CampaignStatus::Scheduled;
        if scheduled != self.scheduled_for.is_some() {
            return Err(DomainError::invariant(format!(
                "campaign {}: scheduledFor must be present iff status is scheduled (status={})",
                self.id, self.status
            )));
        }

        let completed = self.status == CampaignStatus::Completed;
        if completed != self.sent_at.is_some() {
            return Err(DomainError::invariant(format!(
                "campaign {}: sentAt must be present iff status is completed (status={})",
                self.id, self.status
            )));
        }

        Ok(())
    }
}

impl Entity for Campaign {
    type Id = CampaignId;

    fn id(&self) -> CampaignId {
        self.id
    }
}

/// Registry row: a campaign plus the display name of its creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignListing {
    #[serde(flatten)]
    pub campaign: Campaign,
    #[serde(default)]
    pub creator_name: Option<String>,
}

impl Entity for CampaignListing {
    type Id = CampaignId;

    fn id(&self) -> CampaignId {
        self.campaign.id
    }
}
