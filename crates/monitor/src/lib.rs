//! `sendwatch-monitor`
//!
//! **Responsibility:** Live monitoring and control of campaign sends.
//!
//! This crate provides:
//! - A mirror of the campaign registry with a derived sending set
//! - Adaptive job-status polling (idle when nothing is sending)
//! - Delivery rate / ETA estimation
//! - Gated campaign commands (send, pause, unschedule, delete)
//!
//! The execution engine is the authority for all campaign state; the
//! monitor only observes it and forwards commands.

pub mod cache;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod estimator;
pub mod events;
pub mod monitor;
pub mod poller;
pub mod registry;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::JobStatusCache;
pub use client::HttpEngine;
pub use config::{ConfigError, MonitorConfig};
pub use coordinator::{CommandCoordinator, CommandError, CommandOutcome};
pub use engine::{CommandAck, EngineError, SendEngine};
pub use estimator::{estimate, format_duration, RateEstimate};
pub use events::{EventSink, MonitorEvent};
pub use monitor::SendMonitor;
pub use poller::{PollReport, PollScheduler, PollState};
pub use registry::CampaignRegistry;
pub use types::{CampaignRow, CommandKind};
