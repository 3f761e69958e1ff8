//! Shared read-model types handed to the presentation layer.

use serde::{Deserialize, Serialize};

use sendwatch_core::{CampaignListing, JobStatus};

use crate::estimator::RateEstimate;

/// The four campaign commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Send,
    Pause,
    Unschedule,
    Delete,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Send => "send",
            CommandKind::Pause => "pause",
            CommandKind::Unschedule => "unschedule",
            CommandKind::Delete => "delete",
        }
    }
}

impl core::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the campaign list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRow {
    pub campaign: CampaignListing,
    /// Last polled job snapshot, only while the campaign is being sent.
    pub job_status: Option<JobStatus>,
    /// Derived from `job_status` at the time the row was built.
    pub rate_estimate: Option<RateEstimate>,
    /// Whether the current user may issue commands for this campaign.
    pub can_edit: bool,
    /// A command for this campaign is in flight; controls should be disabled.
    pub command_pending: bool,
}
