//! Error types for federation setup.

use fedsync_client::ClientError;
use thiserror::Error;

/// Result type for federation setup.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors that can occur while provisioning and wiring instances.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// A remote call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A creation was refused but the entity could not be found afterwards.
    #[error("{kind} {key} was refused on creation and is not listed")]
    Inconsistent { kind: &'static str, key: String },

    /// A freshly configured sync record failed its connection test.
    #[error("sync test from {holder} to {server} failed (status {status}): {message}")]
    Handshake {
        holder: String,
        server: String,
        status: i64,
        message: String,
    },

    /// No instance with this name is part of the federation.
    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    /// The holder has no sync record pointing at the peer.
    #[error("{holder} has no sync record for {peer}")]
    UnknownEdge { holder: String, peer: String },

    /// Background workers did not become healthy in time.
    #[error("{instance} not ready after {attempts} attempts (unhealthy: {queues})")]
    NotReady {
        instance: String,
        attempts: u32,
        queues: String,
    },

    /// The federation configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
