//! Federation setup.
//!
//! Brings a hub and its spokes into a known state and wires them together:
//!
//! - [`Provisioner`] creates the host organisation, the three role users and
//!   the URL settings of one instance, idempotently
//! - [`Topology`] describes sync edges as data; [`Federation::build`] realises
//!   them as pull-only server records on the holders
//! - [`wait_until_ready`] gates verification on healthy background workers
//! - [`export_credentials`] writes every login to `auth.json` and `auth.csv`
//!
//! Every creation goes through [`find_or_create`], so running setup twice
//! leaves the federation unchanged.

mod builder;
mod config;
mod error;
mod export;
mod federation;
mod filters;
mod graph;
mod instance;
mod provision;
mod readiness;
mod upsert;

pub use config::{FederationConfig, INSTANCE_CONFIG_FILE, InstanceConfig};
pub use error::{TopologyError, TopologyResult};
pub use export::{
    CSV_FILE, CSV_HEADER, Credential, JSON_FILE, PASSWORD_PLACEHOLDER, collect_credentials,
    export_credentials, generate_password, write_credentials,
};
pub use federation::Federation;
pub use graph::{EdgeSpec, Topology};
pub use instance::{Instance, InstanceUsers};
pub use provision::Provisioner;
pub use readiness::{ReadinessPolicy, wait_until_all_ready, wait_until_ready};
pub use upsert::{Upsert, find_or_create};
