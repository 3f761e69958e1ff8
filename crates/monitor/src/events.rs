//! Notifications published to the presentation layer.

use serde::Serialize;
use tokio::sync::broadcast;

use sendwatch_core::CampaignId;

use crate::poller::PollState;
use crate::types::CommandKind;

/// Capacity of the event channel; slow subscribers lag rather than block.
pub const EVENT_CAPACITY: usize = 256;

/// Event emitted by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// The campaign registry was asked to refresh out of cycle.
    RegistryInvalidated,
    /// Aggregate analytics (totals, charts) are stale and should be refetched.
    AnalyticsInvalidated,
    /// A poll observed a send job in the `completed` state.
    JobCompleted { campaign_id: CampaignId },
    /// The poll scheduler switched between idle and active.
    PollStateChanged { state: PollState },
    CommandSucceeded {
        command: CommandKind,
        campaign_id: CampaignId,
        message: String,
    },
    CommandFailed {
        command: CommandKind,
        campaign_id: CampaignId,
        error: String,
    },
}

/// Broadcast sender shared by the registry, poller and coordinator.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; having no subscribers is not an error.
    pub fn emit(&self, event: MonitorEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}
