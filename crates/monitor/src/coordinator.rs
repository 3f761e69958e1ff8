//! Campaign commands (send, pause, unschedule, delete).
//!
//! Each command is gated client-side, forwarded to the execution engine and,
//! on success, reconciled by invalidating the registry (and evicting the job
//! cache entry for deletes). Nothing is changed optimistically: the engine
//! drives the actual transition and the monitor observes it on the next
//! refresh.
//!
//! Commands for the same campaign are not serialized here. Duplicate or
//! overlapping commands are arbitrated by the engine; [`CommandCoordinator::is_pending`]
//! lets the UI disable controls while one is in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use sendwatch_auth::{authorize_edit, AuthzError, Capabilities};
use sendwatch_core::{Campaign, CampaignId, CampaignStatus};

use crate::cache::JobStatusCache;
use crate::engine::{EngineError, SendEngine};
use crate::events::{EventSink, MonitorEvent};
use crate::registry::CampaignRegistry;
use crate::types::CommandKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("campaign {0} is not in the current campaign list")]
    UnknownCampaign(CampaignId),

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("cannot {command} campaign {campaign_id} while it is {status}")]
    InvalidState {
        command: CommandKind,
        campaign_id: CampaignId,
        status: CampaignStatus,
    },

    #[error("engine rejected command: {0}")]
    Engine(#[from] EngineError),
}

impl CommandError {
    /// Whether the command was stopped before any request was made.
    pub fn is_client_side(&self) -> bool {
        !matches!(self, CommandError::Engine(_))
    }

    /// Message to show the user; engine failures use the server's text.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Engine(err) => err.user_message().to_string(),
            other => other.to_string(),
        }
    }
}

/// Result of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub command: CommandKind,
    pub campaign_id: CampaignId,
    pub message: String,
}

/// Whether `command` is allowed for a campaign in `status`.
pub fn transition_allowed(command: CommandKind, status: CampaignStatus) -> bool {
    match command {
        CommandKind::Send => status == CampaignStatus::Draft,
        CommandKind::Pause => status == CampaignStatus::Sending,
        CommandKind::Unschedule => status == CampaignStatus::Scheduled,
        CommandKind::Delete => true,
    }
}

pub struct CommandCoordinator {
    engine: Arc<dyn SendEngine>,
    registry: Arc<CampaignRegistry>,
    cache: JobStatusCache,
    capabilities: Capabilities,
    events: EventSink,
    pending: Mutex<HashMap<CampaignId, usize>>,
}

impl CommandCoordinator {
    pub fn new(
        engine: Arc<dyn SendEngine>,
        registry: Arc<CampaignRegistry>,
        cache: JobStatusCache,
        capabilities: Capabilities,
        events: EventSink,
    ) -> Self {
        Self {
            engine,
            registry,
            cache,
            capabilities,
            events,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Start delivering a draft campaign.
    pub async fn send(&self, id: CampaignId) -> Result<CommandOutcome, CommandError> {
        self.execute(CommandKind::Send, id).await
    }

    /// Pause a campaign that is currently sending.
    pub async fn pause(&self, id: CampaignId) -> Result<CommandOutcome, CommandError> {
        self.execute(CommandKind::Pause, id).await
    }

    /// Return a scheduled campaign to draft.
    pub async fn unschedule(&self, id: CampaignId) -> Result<CommandOutcome, CommandError> {
        self.execute(CommandKind::Unschedule, id).await
    }

    pub async fn delete(&self, id: CampaignId) -> Result<CommandOutcome, CommandError> {
        self.execute(CommandKind::Delete, id).await
    }

    /// Commands the current user could issue for `campaign` right now.
    pub fn available_commands(&self, campaign: &Campaign) -> Vec<CommandKind> {
        if authorize_edit(&self.capabilities, campaign).is_err() {
            return Vec::new();
        }
        [
            CommandKind::Send,
            CommandKind::Pause,
            CommandKind::Unschedule,
            CommandKind::Delete,
        ]
        .into_iter()
        .filter(|kind| transition_allowed(*kind, campaign.status))
        .collect()
    }

    /// Run the client-side gate for `command` without issuing it.
    pub fn check(&self, command: CommandKind, id: CampaignId) -> Result<(), CommandError> {
        let listing = self
            .registry
            .find(id)
            .ok_or(CommandError::UnknownCampaign(id))?;
        let campaign = &listing.campaign;

        authorize_edit(&self.capabilities, campaign)?;

        if !transition_allowed(command, campaign.status) {
            return Err(CommandError::InvalidState {
                command,
                campaign_id: id,
                status: campaign.status,
            });
        }

        Ok(())
    }

    /// Whether a command for `id` is in flight.
    pub fn is_pending(&self, id: CampaignId) -> bool {
        self.pending_map().get(&id).is_some_and(|n| *n > 0)
    }

    async fn execute(&self, command: CommandKind, id: CampaignId) -> Result<CommandOutcome, CommandError> {
        if let Err(err) = self.check(command, id) {
            warn!(command = %command, campaign_id = %id, error = %err, "command rejected before dispatch");
            self.emit_failure(command, id, &err);
            return Err(err);
        }

        let _pending = PendingGuard::acquire(self, id);

        let result = match command {
            CommandKind::Send => self.engine.send(id).await.map(|ack| ack.message),
            CommandKind::Pause => self.engine.pause(id).await.map(|ack| ack.message),
            CommandKind::Unschedule => self.engine.unschedule(id).await.map(|ack| ack.message),
            CommandKind::Delete => self
                .engine
                .delete(id)
                .await
                .map(|()| "Campaign deleted".to_string()),
        };

        match result {
            Ok(message) => {
                info!(command = %command, campaign_id = %id, "command accepted by engine");
                if command == CommandKind::Delete && self.cache.evict(id).is_some() {
                    info!(campaign_id = %id, "evicted job status of deleted campaign");
                }
                self.registry.invalidate();
                self.events.emit(MonitorEvent::CommandSucceeded {
                    command,
                    campaign_id: id,
                    message: message.clone(),
                });
                Ok(CommandOutcome {
                    command,
                    campaign_id: id,
                    message,
                })
            }
            Err(err) => {
                warn!(command = %command, campaign_id = %id, error = %err, "command failed");
                let err = CommandError::Engine(err);
                self.emit_failure(command, id, &err);
                Err(err)
            }
        }
    }

    fn emit_failure(&self, command: CommandKind, id: CampaignId, err: &CommandError) {
        self.events.emit(MonitorEvent::CommandFailed {
            command,
            campaign_id: id,
            error: err.user_message(),
        });
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<CampaignId, usize>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl core::fmt::Debug for CommandCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandCoordinator")
            .field("user_id", &self.capabilities.user_id())
            .field("pending", &self.pending_map().len())
            .finish()
    }
}

/// Marks a campaign as having a command in flight until dropped.
///
/// Dropping also covers the caller abandoning the command future.
struct PendingGuard<'a> {
    coordinator: &'a CommandCoordinator,
    id: CampaignId,
}

impl<'a> PendingGuard<'a> {
    fn acquire(coordinator: &'a CommandCoordinator, id: CampaignId) -> Self {
        *coordinator.pending_map().entry(id).or_insert(0) += 1;
        Self { coordinator, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.coordinator.pending_map();
        if let Some(n) = pending.get_mut(&self.id) {
            *n -= 1;
            if *n == 0 {
                pending.remove(&self.id);
            }
        }
    }
}
