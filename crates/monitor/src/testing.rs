//! In-memory engine double and fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use sendwatch_core::{
    Campaign, CampaignId, CampaignListing, CampaignStatus, DeliveryCounters, JobState, JobStatus,
    UserId,
};

use crate::engine::{CommandAck, EngineError, SendEngine};
use crate::types::CommandKind;

/// Scriptable [`SendEngine`] that records every call.
#[derive(Debug, Default)]
pub struct FakeEngine {
    campaigns: Mutex<Vec<CampaignListing>>,
    fail_campaigns: AtomicBool,
    jobs: Mutex<HashMap<CampaignId, Result<JobStatus, EngineError>>>,
    job_delay: Mutex<Option<Duration>>,
    job_delays: Mutex<HashMap<CampaignId, Duration>>,
    command_error: Mutex<Option<EngineError>>,
    campaign_calls: AtomicUsize,
    job_calls: AtomicUsize,
    commands: Mutex<Vec<(CommandKind, CampaignId)>>,
}

impl FakeEngine {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_campaigns(&self, campaigns: Vec<CampaignListing>) {
        *self.campaigns.lock().unwrap() = campaigns;
    }

    pub fn fail_campaigns(&self, fail: bool) {
        self.fail_campaigns.store(fail, Ordering::SeqCst);
    }

    pub fn set_job(&self, id: CampaignId, job: JobStatus) {
        self.jobs.lock().unwrap().insert(id, Ok(job));
    }

    pub fn fail_job(&self, id: CampaignId) {
        self.jobs
            .lock()
            .unwrap()
            .insert(id, Err(EngineError::Network("connection reset".to_string())));
    }

    pub fn set_job_delay(&self, delay: Duration) {
        *self.job_delay.lock().unwrap() = Some(delay);
    }

    /// Delay only `id`'s job status responses.
    pub fn set_job_delay_for(&self, id: CampaignId, delay: Duration) {
        self.job_delays.lock().unwrap().insert(id, delay);
    }

    /// Make every subsequent command fail with `err`.
    pub fn fail_commands(&self, err: EngineError) {
        *self.command_error.lock().unwrap() = Some(err);
    }

    pub fn campaign_calls(&self) -> usize {
        self.campaign_calls.load(Ordering::SeqCst)
    }

    pub fn job_calls(&self) -> usize {
        self.job_calls.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<(CommandKind, CampaignId)> {
        self.commands.lock().unwrap().clone()
    }

    fn record(&self, kind: CommandKind, id: CampaignId) -> Result<CommandAck, EngineError> {
        self.commands.lock().unwrap().push((kind, id));
        match self.command_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(CommandAck {
                message: format!("{kind} accepted"),
            }),
        }
    }
}

#[async_trait::async_trait]
impl SendEngine for FakeEngine {
    async fn campaigns(&self) -> Result<Vec<CampaignListing>, EngineError> {
        self.campaign_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_campaigns.load(Ordering::SeqCst) {
            return Err(EngineError::Api {
                status: 503,
                message: "registry unavailable".to_string(),
            });
        }
        Ok(self.campaigns.lock().unwrap().clone())
    }

    async fn job_status(&self, id: CampaignId) -> Result<JobStatus, EngineError> {
        self.job_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .job_delays
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .or(*self.job_delay.lock().unwrap());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.jobs
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Ok(JobStatus::no_job()))
    }

    async fn send(&self, id: CampaignId) -> Result<CommandAck, EngineError> {
        self.record(CommandKind::Send, id)
    }

    async fn pause(&self, id: CampaignId) -> Result<CommandAck, EngineError> {
        self.record(CommandKind::Pause, id)
    }

    async fn unschedule(&self, id: CampaignId) -> Result<CommandAck, EngineError> {
        self.record(CommandKind::Unschedule, id)
    }

    async fn delete(&self, id: CampaignId) -> Result<(), EngineError> {
        self.record(CommandKind::Delete, id).map(|_| ())
    }
}

/// A listing in `status` with the timestamps that status requires.
pub fn listing(status: CampaignStatus) -> CampaignListing {
    listing_owned_by(status, UserId::new())
}

pub fn listing_owned_by(status: CampaignStatus, owner: UserId) -> CampaignListing {
    let now = Utc::now();
    CampaignListing {
        campaign: Campaign {
            id: CampaignId::new(),
            name: format!("{status} campaign"),
            subject: "Hello".to_string(),
            status,
            scheduled_for: (status == CampaignStatus::Scheduled).then_some(now),
            sent_at: (status == CampaignStatus::Completed).then_some(now),
            counters: DeliveryCounters::default(),
            user_id: owner,
        },
        creator_name: Some("Test User".to_string()),
    }
}

/// A running job that started 10 seconds ago.
pub fn running_job(processed: i64, total: i64) -> JobStatus {
    JobStatus {
        has_job: true,
        status: Some(JobState::Running),
        started_at: Some(Utc::now() - chrono::Duration::seconds(10)),
        total_recipients: Some(total),
        processed_count: Some(processed),
        sent_count: Some(processed),
        failed_count: Some(0),
        current_batch: Some(1),
        total_batches: Some(10),
        progress: Some(processed as f64 * 100.0 / total.max(1) as f64),
    }
}
