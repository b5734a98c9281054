//! Error types for propagation scenarios.

use fedsync_client::ClientError;
use fedsync_topology::TopologyError;
use thiserror::Error;

/// Result type for scenario execution.
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Errors that end a scenario.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Client(#[from] ClientError),

    /// An observed state differs from the expected one.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// The expected state never showed up within the settle policy.
    #[error("{what} did not settle after {attempts} attempts")]
    SettleTimeout { what: String, attempts: u32 },

    /// The federation is too small for the scenario.
    #[error("scenario needs {needed} spokes, the federation has {available}")]
    NotEnoughSpokes { needed: usize, available: usize },

    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
}

impl VerifyError {
    /// True for failures of the checked behaviour itself, as opposed to
    /// failures to drive the federation.
    pub fn is_assertion(&self) -> bool {
        matches!(self, VerifyError::Assertion(_) | VerifyError::SettleTimeout { .. })
    }
}
