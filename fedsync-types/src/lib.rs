//! Data model for the fedsync federation harness.
//!
//! This crate defines the records exchanged with sharing instances:
//! - Instance-assigned identifiers
//! - Organisations, users and roles
//! - Sync server records (graph edges), their filter rules and descriptors
//! - Tags and sharing groups
//! - Events, attributes and objects with their distribution levels
//! - Server settings and worker health
//!
//! Field names follow the instance's REST representation so the records can
//! be sent and received without an intermediate wire layer.

mod distribution;
mod event;
pub mod flags;
mod ids;
mod org;
pub mod rules;
mod server;
pub mod settings;
mod sharing;

pub use distribution::Distribution;
pub use event::{Attribute, Event, EventObject, TagRef};
pub use ids::RemoteId;
pub use org::{NewOrganisation, NewUser, OrgRef, Organisation, Role, User, sync_user_email};
pub use rules::{FilterRules, RuleSet};
pub use server::{
    ConnectionTest, SYNC_NAME_PREFIX, ServerUpdate, SyncDescriptor, SyncServer, counterpart_name,
};
pub use settings::ServerSettings;
pub use sharing::{NewSharingGroup, NewTag, SharingGroup, SharingGroupServer, Tag};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while interpreting model values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid distribution level: {0}")]
    InvalidDistribution(u8),

    #[error("invalid role id: {0}")]
    InvalidRole(u8),
}
