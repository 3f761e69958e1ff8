//! Top-level monitor state shared with the presentation layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sendwatch_auth::{authorize_edit, Capabilities};
use sendwatch_core::{CampaignId, CampaignListing, Entity};

use crate::cache::JobStatusCache;
use crate::config::MonitorConfig;
use crate::coordinator::CommandCoordinator;
use crate::engine::{EngineError, SendEngine};
use crate::estimator::estimate;
use crate::events::{EventSink, MonitorEvent};
use crate::poller::{PollReport, PollScheduler, PollState};
use crate::registry::CampaignRegistry;
use crate::types::CampaignRow;

/// Running monitor: registry refresh, job polling and command handling.
///
/// Background work is tied to this value. [`SendMonitor::shutdown`] waits for
/// it to stop; dropping the monitor cancels it without waiting. Either way no
/// further requests are issued and in-flight results are discarded.
pub struct SendMonitor {
    config: MonitorConfig,
    registry: Arc<CampaignRegistry>,
    poller: Arc<PollScheduler>,
    cache: JobStatusCache,
    coordinator: Arc<CommandCoordinator>,
    events: EventSink,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SendMonitor {
    /// Wire up the components and spawn the background loops.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: MonitorConfig, engine: Arc<dyn SendEngine>, capabilities: Capabilities) -> Self {
        let events = EventSink::new();
        let cache = JobStatusCache::new();
        let registry = Arc::new(CampaignRegistry::new(engine.clone(), events.clone()));
        let poller = Arc::new(PollScheduler::new(
            engine.clone(),
            cache.clone(),
            registry.clone(),
            events.clone(),
            config.poll_interval,
        ));
        let coordinator = Arc::new(CommandCoordinator::new(
            engine,
            registry.clone(),
            cache.clone(),
            capabilities,
            events.clone(),
        ));

        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(registry.clone().run(config.registry_interval, cancel.child_token())),
            tokio::spawn(poller.clone().run(cancel.child_token())),
        ];

        info!(
            api_url = %config.api_url,
            user_id = %coordinator.capabilities().user_id(),
            "send monitor started"
        );

        Self {
            config,
            registry,
            poller,
            cache,
            coordinator,
            events,
            cancel,
            tasks,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CampaignRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &JobStatusCache {
        &self.cache
    }

    pub fn coordinator(&self) -> &Arc<CommandCoordinator> {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn poll_state(&self) -> PollState {
        self.poller.state()
    }

    /// Refresh the registry now and wait for the result.
    pub async fn refresh(&self) -> Result<usize, EngineError> {
        self.registry.refresh().await
    }

    /// Poll job status for the current sending set now, outside the schedule.
    pub async fn poll_now(&self) -> PollReport {
        self.poller
            .poll_once(&self.registry.sending_set(), &self.cancel)
            .await
    }

    /// One row per campaign in the latest registry snapshot.
    ///
    /// Job status and rate estimate are only attached to campaigns that are
    /// sending and have been polled at least once.
    pub fn rows(&self, now: DateTime<Utc>) -> Vec<CampaignRow> {
        self.registry
            .snapshot()
            .iter()
            .map(|listing| self.build_row(listing.clone(), now))
            .collect()
    }

    pub fn row(&self, id: CampaignId, now: DateTime<Utc>) -> Option<CampaignRow> {
        self.registry.find(id).map(|listing| self.build_row(listing, now))
    }

    /// Rows for campaigns currently sending.
    pub fn sending_rows(&self, now: DateTime<Utc>) -> Vec<CampaignRow> {
        self.rows(now)
            .into_iter()
            .filter(|row| row.campaign.campaign.is_sending())
            .collect()
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Cancel background work and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(err) = task.await {
                warn!(error = %err, "monitor task ended abnormally");
            }
        }
        info!("send monitor stopped");
    }

    fn build_row(&self, listing: CampaignListing, now: DateTime<Utc>) -> CampaignRow {
        let id = listing.id();
        let job_status = if listing.campaign.is_sending() {
            self.cache.get(id)
        } else {
            None
        };
        let rate_estimate = job_status.as_ref().map(|job| estimate(job, now));
        let can_edit = authorize_edit(self.coordinator.capabilities(), &listing.campaign).is_ok();

        CampaignRow {
            campaign: listing,
            job_status,
            rate_estimate,
            can_edit,
            command_pending: self.coordinator.is_pending(id),
        }
    }
}

impl Drop for SendMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl core::fmt::Debug for SendMonitor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SendMonitor")
            .field("api_url", &self.config.api_url)
            .field("poll_state", &self.poller.state())
            .field("running", &self.is_running())
            .finish()
    }
}
