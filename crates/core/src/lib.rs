//! `sendwatch-core`: campaign and send-job domain model.
//!
//! This crate contains **pure domain** types (no transport, no timers).

pub mod campaign;
pub mod entity;
pub mod error;
pub mod id;
pub mod job;

pub use campaign::{Campaign, CampaignListing, CampaignStatus, DeliveryCounters};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CampaignId, UserId};
pub use job::{JobState, JobStatus};
