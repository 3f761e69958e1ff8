//! Send-job status snapshots reported by the execution engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of the server-side send job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    /// Any state this client does not know about yet.
    #[serde(other)]
    Unknown,
}

/// Point-in-time snapshot of one campaign's send job.
///
/// Every timing and counter field is optional: the engine omits fields it
/// does not know yet (e.g. `startedAt` before the first batch is picked up).
/// Consumers must treat absence as "insufficient data", never as zero work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobStatus {
    /// `false` when the campaign has no active job (finished or never started).
    pub has_job: bool,
    pub status: Option<JobState>,
    pub started_at: Option<DateTime<Utc>>,
    pub total_recipients: Option<i64>,
    pub processed_count: Option<i64>,
    pub sent_count: Option<i64>,
    pub failed_count: Option<i64>,
    pub current_batch: Option<i64>,
    pub total_batches: Option<i64>,
    /// Authoritative server-computed progress, 0–100.
    pub progress: Option<f64>,
}

impl JobStatus {
    /// A snapshot for a campaign with no job on the engine.
    pub fn no_job() -> Self {
        Self::default()
    }

    pub fn is_completed(&self) -> bool {
        self.status == Some(JobState::Completed)
    }

    /// Recipients not yet processed (never negative).
    pub fn remaining(&self) -> i64 {
        let total = self.total_recipients.unwrap_or(0);
        let processed = self.processed_count.unwrap_or(0);
        total.saturating_sub(processed).max(0)
    }
}
