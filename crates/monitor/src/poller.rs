//! Background job-status poller for sending campaigns.
//!
//! State machine:
//! - **Idle**: sending set empty. No timer, no requests.
//! - **Active**: sending set non-empty. Poll immediately, then every
//!   `interval` until the set becomes empty again.
//!
//! Transitions are driven only by sending-set changes published by the
//! [`CampaignRegistry`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sendwatch_core::{CampaignId, JobStatus};

use crate::cache::JobStatusCache;
use crate::engine::{EngineError, SendEngine};
use crate::events::{EventSink, MonitorEvent};
use crate::registry::CampaignRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    Idle,
    Active,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Campaigns whose cache entry was replaced.
    pub updated: Vec<CampaignId>,
    /// Campaigns whose fetch failed (stale entry kept).
    pub failed: Vec<CampaignId>,
    /// Campaigns whose job reported `completed`.
    pub completed: Vec<CampaignId>,
    /// Teardown fired mid-cycle; outstanding results were dropped.
    pub discarded: bool,
}

pub struct PollScheduler {
    engine: Arc<dyn SendEngine>,
    cache: JobStatusCache,
    registry: Arc<CampaignRegistry>,
    events: EventSink,
    interval: Duration,
    state: watch::Sender<PollState>,
}

impl PollScheduler {
    pub fn new(
        engine: Arc<dyn SendEngine>,
        cache: JobStatusCache,
        registry: Arc<CampaignRegistry>,
        events: EventSink,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            engine,
            cache,
            registry,
            events,
            interval,
            state,
        }
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    /// Run one poll cycle over `ids`.
    ///
    /// Fetches are issued concurrently and isolated: each result is applied
    /// as soon as it arrives, and a failed fetch is logged and leaves that
    /// campaign's previous entry untouched. If `cancel` fires mid-cycle the
    /// outstanding fetches are dropped and nothing more is applied.
    pub async fn poll_once(&self, ids: &BTreeSet<CampaignId>, cancel: &CancellationToken) -> PollReport {
        let mut fetches: FuturesUnordered<_> = ids.iter().map(|&id| self.fetch(id)).collect();
        let mut report = PollReport::default();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(outstanding = fetches.len(), "discarding job status results after teardown");
                    report.discarded = true;
                    return report;
                }
                next = fetches.next() => match next {
                    Some((id, result)) => self.apply(id, result, &mut report),
                    None => break,
                },
            }
        }

        // The sending set may have shrunk while fetches were in flight.
        self.prune(&self.registry.sending_set());
        self.handle_completed(&report.completed);

        debug!(
            updated = report.updated.len(),
            failed = report.failed.len(),
            completed = report.completed.len(),
            "poll cycle finished"
        );
        report
    }

    /// Drive the Idle/Active state machine until `cancel` fires.
    ///
    /// While Active, each tick starts a fetch for every sending campaign that
    /// has none outstanding. A campaign whose fetch is slow is skipped on
    /// later ticks until it resolves; the others keep polling on schedule.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "job status poller started");
        let mut sending = self.registry.watch_sending();

        'outer: loop {
            let mut ids = sending.borrow_and_update().clone();
            self.prune(&ids);

            if ids.is_empty() {
                self.set_state(PollState::Idle);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = sending.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }
            }

            self.set_state(PollState::Active);

            // First tick completes immediately.
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            // Dropped on leaving Active or on teardown; late results are never applied.
            let mut in_flight = FuturesUnordered::new();
            let mut fetching: HashSet<CampaignId> = HashSet::new();

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'outer,
                    changed = sending.changed() => {
                        if changed.is_err() {
                            break 'outer;
                        }
                        let next = sending.borrow_and_update().clone();
                        if next.is_empty() {
                            continue 'outer;
                        }
                        self.prune(&next);
                        ids = next;
                    }
                    Some((id, result)) = in_flight.next(), if !in_flight.is_empty() => {
                        fetching.remove(&id);
                        let mut report = PollReport::default();
                        self.apply(id, result, &mut report);
                        self.handle_completed(&report.completed);
                    }
                    _ = ticker.tick() => {
                        for &id in &ids {
                            if fetching.insert(id) {
                                in_flight.push(self.fetch(id));
                            } else {
                                debug!(campaign_id = %id, "job status fetch still outstanding; skipping tick");
                            }
                        }
                    }
                }
            }
        }

        self.set_state(PollState::Idle);
        info!("job status poller stopped");
    }

    fn fetch(&self, id: CampaignId) -> BoxFuture<'static, (CampaignId, Result<JobStatus, EngineError>)> {
        let engine = self.engine.clone();
        async move { (id, engine.job_status(id).await) }.boxed()
    }

    /// Record one fetch result. Only campaigns still sending are written.
    fn apply(&self, id: CampaignId, result: Result<JobStatus, EngineError>, report: &mut PollReport) {
        match result {
            Ok(status) => {
                if status.is_completed() {
                    report.completed.push(id);
                }
                if self.registry.is_sending(id) {
                    self.cache.upsert(id, status);
                    report.updated.push(id);
                }
            }
            Err(err) => {
                warn!(campaign_id = %id, error = %err, "job status fetch failed; keeping last snapshot");
                report.failed.push(id);
            }
        }
    }

    fn handle_completed(&self, completed: &[CampaignId]) {
        if completed.is_empty() {
            return;
        }
        for id in completed {
            info!(campaign_id = %id, "send job completed");
            self.events.emit(MonitorEvent::JobCompleted { campaign_id: *id });
        }
        // The registry's own status lags until its next refresh; pull the
        // final counts now.
        self.registry.invalidate();
        self.events.emit(MonitorEvent::AnalyticsInvalidated);
    }

    fn prune(&self, active: &BTreeSet<CampaignId>) {
        let pruned = self.cache.remove_all_except(active);
        if !pruned.is_empty() {
            debug!(pruned = pruned.len(), "dropped job status for campaigns no longer sending");
        }
    }

    fn set_state(&self, next: PollState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        if changed {
            debug!(state = ?next, "poller state changed");
            self.events.emit(MonitorEvent::PollStateChanged { state: next });
        }
    }
}

impl core::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("interval", &self.interval)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{listing, running_job, FakeEngine};
    use sendwatch_core::{CampaignListing, CampaignStatus, Entity, JobState};

    struct Harness {
        engine: Arc<FakeEngine>,
        cache: JobStatusCache,
        registry: Arc<CampaignRegistry>,
        events: EventSink,
        poller: Arc<PollScheduler>,
    }

    fn harness() -> Harness {
        let engine = FakeEngine::arc();
        let events = EventSink::new();
        let cache = JobStatusCache::new();
        let registry = Arc::new(CampaignRegistry::new(engine.clone(), events.clone()));
        let poller = Arc::new(PollScheduler::new(
            engine.clone(),
            cache.clone(),
            registry.clone(),
            events.clone(),
            Duration::from_secs(2),
        ));
        Harness {
            engine,
            cache,
            registry,
            events,
            poller,
        }
    }

    fn ids(listings: &[&CampaignListing]) -> BTreeSet<CampaignId> {
        listings.iter().map(|l| l.id()).collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn poll_once_updates_every_sending_campaign() {
        let h = harness();
        let a = listing(CampaignStatus::Sending);
        let b = listing(CampaignStatus::Sending);
        h.registry.apply(vec![a.clone(), b.clone()]);
        h.engine.set_job(a.id(), running_job(10, 100));
        h.engine.set_job(b.id(), running_job(20, 100));

        let report = h.poller.poll_once(&ids(&[&a, &b]), &CancellationToken::new()).await;

        assert_eq!(report.updated.len(), 2);
        assert_eq!(h.cache.get(a.id()).unwrap().processed_count, Some(10));
        assert_eq!(h.cache.get(b.id()).unwrap().processed_count, Some(20));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_stale_entry_and_does_not_block_others() {
        let h = harness();
        let a = listing(CampaignStatus::Sending);
        let b = listing(CampaignStatus::Sending);
        h.registry.apply(vec![a.clone(), b.clone()]);
        h.engine.set_job(a.id(), running_job(10, 100));
        h.engine.set_job(b.id(), running_job(20, 100));

        let cancel = CancellationToken::new();
        h.poller.poll_once(&ids(&[&a, &b]), &cancel).await;

        h.engine.fail_job(a.id());
        h.engine.set_job(b.id(), running_job(40, 100));
        let report = h.poller.poll_once(&ids(&[&a, &b]), &cancel).await;

        assert_eq!(report.failed, vec![a.id()]);
        assert_eq!(report.updated, vec![b.id()]);
        assert_eq!(h.cache.get(a.id()).unwrap().processed_count, Some(10));
        assert_eq!(h.cache.get(b.id()).unwrap().processed_count, Some(40));
    }

    #[tokio::test]
    async fn campaign_leaving_sending_set_is_pruned() {
        let h = harness();
        let a = listing(CampaignStatus::Sending);
        let mut b = listing(CampaignStatus::Sending);
        h.registry.apply(vec![a.clone(), b.clone()]);
        h.engine.set_job(a.id(), running_job(10, 100));
        h.engine.set_job(b.id(), running_job(20, 100));

        let cancel = CancellationToken::new();
        h.poller.poll_once(&ids(&[&a, &b]), &cancel).await;
        assert!(h.cache.contains(b.id()));

        b.campaign.status = CampaignStatus::Draft;
        h.registry.apply(vec![a.clone(), b.clone()]);
        h.poller.poll_once(&ids(&[&a]), &cancel).await;

        assert!(h.cache.contains(a.id()));
        assert!(!h.cache.contains(b.id()));
    }

    #[tokio::test]
    async fn completed_job_invalidates_registry_and_analytics() {
        let h = harness();
        let a = listing(CampaignStatus::Sending);
        h.registry.apply(vec![a.clone()]);
        let mut done = running_job(100, 100);
        done.status = Some(JobState::Completed);
        h.engine.set_job(a.id(), done);

        let mut rx = h.events.subscribe();
        let report = h.poller.poll_once(&ids(&[&a]), &CancellationToken::new()).await;

        assert_eq!(report.completed, vec![a.id()]);
        assert_eq!(
            rx.recv().await.unwrap(),
            MonitorEvent::JobCompleted { campaign_id: a.id() }
        );
        assert_eq!(rx.recv().await.unwrap(), MonitorEvent::RegistryInvalidated);
        assert_eq!(rx.recv().await.unwrap(), MonitorEvent::AnalyticsInvalidated);
    }

    #[tokio::test]
    async fn results_after_teardown_are_discarded() {
        let h = harness();
        let a = listing(CampaignStatus::Sending);
        h.registry.apply(vec![a.clone()]);
        h.engine.set_job(a.id(), running_job(10, 100));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = h.poller.poll_once(&ids(&[&a]), &cancel).await;

        assert!(report.discarded);
        assert!(h.cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_poller_makes_no_requests() {
        let h = harness();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.poller.clone().run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.engine.job_calls(), 0);
        assert_eq!(h.poller.state(), PollState::Idle);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn becoming_active_polls_once_immediately_then_on_interval() {
        let h = harness();
        let a = listing(CampaignStatus::Sending);
        h.engine.set_job(a.id(), running_job(10, 100));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.poller.clone().run(cancel.clone()));
        settle().await;

        h.registry.apply(vec![a.clone()]);
        settle().await;
        assert_eq!(h.poller.state(), PollState::Active);
        assert_eq!(h.engine.job_calls(), 1);
        assert!(h.cache.contains(a.id()));

        // Still inside the first interval.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.engine.job_calls(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(h.engine.job_calls(), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn emptied_sending_set_stops_polling_and_clears_cache() {
        let h = harness();
        let mut a = listing(CampaignStatus::Sending);
        h.engine.set_job(a.id(), running_job(10, 100));
        h.registry.apply(vec![a.clone()]);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.poller.clone().run(cancel.clone()));
        settle().await;
        assert_eq!(h.engine.job_calls(), 1);

        a.campaign.status = CampaignStatus::Completed;
        a.campaign.sent_at = Some(chrono::Utc::now());
        h.registry.apply(vec![a.clone()]);
        settle().await;

        assert_eq!(h.poller.state(), PollState::Idle);
        assert!(h.cache.is_empty());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(h.engine.job_calls(), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_poll_fires_after_teardown() {
        let h = harness();
        let a = listing(CampaignStatus::Sending);
        h.engine.set_job(a.id(), running_job(10, 100));
        h.registry.apply(vec![a.clone()]);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.poller.clone().run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(3)).await;
        let calls = h.engine.job_calls();
        assert_eq!(calls, 2);

        cancel.cancel();
        task.await.unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(h.engine.job_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_fetch_is_dropped_on_teardown() {
        let h = harness();
        let a = listing(CampaignStatus::Sending);
        h.engine.set_job(a.id(), running_job(10, 100));
        h.engine.set_job_delay(Duration::from_secs(1));
        h.registry.apply(vec![a.clone()]);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.poller.clone().run(cancel.clone()));
        settle().await;
        assert_eq!(h.engine.job_calls(), 1);

        cancel.cancel();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(h.cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_once_applies_each_result_as_it_arrives() {
        let h = harness();
        let slow = listing(CampaignStatus::Sending);
        let fast = listing(CampaignStatus::Sending);
        h.registry.apply(vec![slow.clone(), fast.clone()]);
        h.engine.fail_job(slow.id());
        h.engine.set_job_delay_for(slow.id(), Duration::from_secs(10));
        h.engine.set_job(fast.id(), running_job(20, 100));

        let poller = h.poller.clone();
        let batch = ids(&[&slow, &fast]);
        let cycle = tokio::spawn(async move { poller.poll_once(&batch, &CancellationToken::new()).await });

        settle().await;
        assert!(!cycle.is_finished());
        assert_eq!(h.cache.get(fast.id()).unwrap().processed_count, Some(20));

        let report = cycle.await.unwrap();
        assert_eq!(report.updated, vec![fast.id()]);
        assert_eq!(report.failed, vec![slow.id()]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_campaign_does_not_hold_back_other_campaigns() {
        let h = harness();
        let slow = listing(CampaignStatus::Sending);
        let fast = listing(CampaignStatus::Sending);
        h.engine.fail_job(slow.id());
        h.engine.set_job_delay_for(slow.id(), Duration::from_secs(10));
        h.engine.set_job(fast.id(), running_job(10, 100));
        h.registry.apply(vec![slow.clone(), fast.clone()]);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.poller.clone().run(cancel.clone()));
        settle().await;
        assert_eq!(h.cache.get(fast.id()).unwrap().processed_count, Some(10));

        // The fast campaign keeps its schedule while the slow fetch is outstanding.
        h.engine.set_job(fast.id(), running_job(30, 100));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.cache.get(fast.id()).unwrap().processed_count, Some(30));
        assert_eq!(h.engine.job_calls(), 3);

        // The slow campaign gets no second fetch while its first is outstanding.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(h.engine.job_calls(), 5);
        assert!(!h.cache.contains(slow.id()));

        cancel.cancel();
        task.await.unwrap();
    }
}
