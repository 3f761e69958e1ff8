//! Execution engine boundary.
//!
//! The engine is the authority for campaign state and send jobs. The monitor
//! only observes it ([`SendEngine::job_status`], [`SendEngine::campaigns`])
//! and asks it to perform transitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sendwatch_core::{CampaignId, CampaignListing, JobStatus};

/// Acknowledgement returned by send/pause/unschedule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandAck {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
}

impl EngineError {
    /// Message suitable for showing to the user (server text when available).
    pub fn user_message(&self) -> &str {
        match self {
            EngineError::Api { message, .. } => message,
            EngineError::Network(msg) | EngineError::Parse(msg) => msg,
        }
    }
}

/// Pull-based view of the execution engine.
#[async_trait::async_trait]
pub trait SendEngine: Send + Sync {
    /// Full campaign registry snapshot.
    async fn campaigns(&self) -> Result<Vec<CampaignListing>, EngineError>;

    /// Latest job snapshot for one campaign.
    async fn job_status(&self, id: CampaignId) -> Result<JobStatus, EngineError>;

    async fn send(&self, id: CampaignId) -> Result<CommandAck, EngineError>;

    async fn pause(&self, id: CampaignId) -> Result<CommandAck, EngineError>;

    async fn unschedule(&self, id: CampaignId) -> Result<CommandAck, EngineError>;

    async fn delete(&self, id: CampaignId) -> Result<(), EngineError>;
}
