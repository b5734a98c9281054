//! Remote instance client for the fedsync harness.
//!
//! Provides two implementations of the [`InstanceApi`] capability set:
//! - [`MispClient`]: JSON over HTTP against a live instance
//! - [`MemoryClient`]: an in-process [`MemoryFederation`] of simulated
//!   instances, used by tests and dry runs
//!
//! Both come with a [`Connector`] that derives clients bound to a given
//! authentication key, which is how the harness switches between the
//! site-admin, org-admin and member identities of each instance.

mod api;
mod error;
pub mod memory;
pub mod misp;

pub use api::{Connector, InstanceApi, OrgScope, normalize_url};
pub use error::{ClientError, ClientResult};
pub use memory::{MemoryClient, MemoryFederation};
pub use misp::{MispClient, MispConfig, MispConnector};
