//! Local mirror of the campaign registry.
//!
//! The registry is owned by the execution engine; this type only holds the
//! latest snapshot, derives the sending set from it and refreshes it on a
//! fixed interval or when invalidated. It is never edited in place.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sendwatch_core::{CampaignId, CampaignListing, Entity};

use crate::engine::{EngineError, SendEngine};
use crate::events::{EventSink, MonitorEvent};

pub type Snapshot = Arc<Vec<CampaignListing>>;

pub struct CampaignRegistry {
    engine: Arc<dyn SendEngine>,
    snapshot: watch::Sender<Snapshot>,
    sending: watch::Sender<BTreeSet<CampaignId>>,
    invalidated: Notify,
    events: EventSink,
}

impl CampaignRegistry {
    pub fn new(engine: Arc<dyn SendEngine>, events: EventSink) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (sending, _) = watch::channel(BTreeSet::new());

        Self {
            engine,
            snapshot,
            sending,
            invalidated: Notify::new(),
            events,
        }
    }

    /// Latest registry snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn find(&self, id: CampaignId) -> Option<CampaignListing> {
        self.snapshot.borrow().iter().find(|c| c.id() == id).cloned()
    }

    /// Campaigns whose last-known status is `sending`.
    pub fn sending_set(&self) -> BTreeSet<CampaignId> {
        self.sending.borrow().clone()
    }

    pub fn is_sending(&self, id: CampaignId) -> bool {
        self.sending.borrow().contains(&id)
    }

    /// Subscribe to sending-set changes.
    ///
    /// Only actual changes are published; a refresh that yields the same
    /// set does not wake subscribers.
    pub fn watch_sending(&self) -> watch::Receiver<BTreeSet<CampaignId>> {
        self.sending.subscribe()
    }

    /// Fetch a fresh snapshot from the engine.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<usize, EngineError> {
        match self.engine.campaigns().await {
            Ok(listings) => {
                let count = listings.len();
                self.apply(listings);
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "campaign registry refresh failed; keeping stale snapshot");
                Err(err)
            }
        }
    }

    /// Request an out-of-cycle refresh.
    ///
    /// Several invalidations before the refresh loop wakes collapse into one
    /// refresh.
    pub fn invalidate(&self) {
        debug!("campaign registry invalidated");
        self.invalidated.notify_one();
        self.events.emit(MonitorEvent::RegistryInvalidated);
    }

    pub(crate) fn apply(&self, listings: Vec<CampaignListing>) {
        for listing in &listings {
            if let Err(err) = listing.campaign.validate() {
                warn!(campaign_id = %listing.id(), error = %err, "registry returned inconsistent campaign");
            }
        }

        let sending: BTreeSet<CampaignId> = listings
            .iter()
            .filter(|c| c.campaign.is_sending())
            .map(|c| c.id())
            .collect();

        self.snapshot.send_replace(Arc::new(listings));
        self.sending.send_if_modified(|current| {
            if *current == sending {
                return false;
            }
            debug!(sending = sending.len(), "sending set changed");
            *current = sending;
            true
        });
    }

    /// Refresh every `interval`, or immediately after [`Self::invalidate`],
    /// until `cancel` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        info!(interval_ms = interval.as_millis() as u64, "campaign registry refresh started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.invalidated.notified() => {
                    ticker.reset();
                }
            }

            // A refresh still in flight at teardown is dropped, never applied.
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.refresh() => {}
            }
        }

        info!("campaign registry refresh stopped");
    }
}

impl core::fmt::Debug for CampaignRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CampaignRegistry")
            .field("campaigns", &self.snapshot.borrow().len())
            .field("sending", &self.sending.borrow().len())
            .finish()
    }
}
