//! Sync server records: the edges of the federation graph.

use crate::flags::bool_flag;
use crate::rules::{FilterRules, rules_as_string};
use crate::{OrgRef, RemoteId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name prefix of every record created from a sync descriptor.
pub const SYNC_NAME_PREFIX: &str = "Sync with ";

/// A server record held by one instance, pointing at a peer instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncServer {
    pub id: RemoteId,
    pub name: String,
    /// Base URL of the peer instance.
    pub url: String,
    /// Key of the sync user on the peer.
    pub authkey: String,
    /// Instance uuid of the peer, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    /// Local id of the organisation representing the peer.
    pub remote_org_id: RemoteId,
    #[serde(default, deserialize_with = "bool_flag")]
    pub pull: bool,
    #[serde(default, deserialize_with = "bool_flag")]
    pub push: bool,
    #[serde(default, with = "rules_as_string")]
    pub push_rules: FilterRules,
    #[serde(default, with = "rules_as_string")]
    pub pull_rules: FilterRules,
}

impl SyncServer {
    /// Name of the counterpart this record syncs with.
    #[must_use]
    pub fn counterpart(&self) -> &str {
        counterpart_name(&self.name)
    }
}

/// Strips the conventional `"Sync with "` prefix from a record name.
#[must_use]
pub fn counterpart_name(record_name: &str) -> &str {
    record_name
        .strip_prefix(SYNC_NAME_PREFIX)
        .unwrap_or(record_name)
}

/// What a sync user exports so that a counterpart can register it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDescriptor {
    /// Not part of the exported config; set by [`Self::named_after_org`].
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub authkey: String,
    /// Host organisation of the exporting instance.
    #[serde(rename = "Organisation")]
    pub organisation: OrgRef,
}

impl SyncDescriptor {
    /// Renames the descriptor after the exporting instance's organisation.
    #[must_use]
    pub fn named_after_org(mut self) -> Self {
        self.name = format!("{SYNC_NAME_PREFIX}{}", self.organisation.name);
        self
    }
}

/// Partial update of a server record; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rules_as_string::optional"
    )]
    pub push_rules: Option<FilterRules>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rules_as_string::optional"
    )]
    pub pull_rules: Option<FilterRules>,
}

impl ServerUpdate {
    /// Pull enabled, push disabled: the state of a freshly configured edge.
    #[must_use]
    pub fn pull_only() -> Self {
        Self {
            pull: Some(true),
            push: Some(false),
            ..Self::default()
        }
    }

    /// Toggles the push flag only.
    #[must_use]
    pub fn push(enabled: bool) -> Self {
        Self {
            push: Some(enabled),
            ..Self::default()
        }
    }

    /// Replaces the push rules only.
    #[must_use]
    pub fn push_rules(rules: FilterRules) -> Self {
        Self {
            push_rules: Some(rules),
            ..Self::default()
        }
    }

    /// Applies the update to a record in place.
    pub fn apply_to(&self, server: &mut SyncServer) {
        if let Some(pull) = self.pull {
            server.pull = pull;
        }
        if let Some(push) = self.push {
            server.push = push;
        }
        if let Some(rules) = &self.push_rules {
            server.push_rules = rules.clone();
        }
        if let Some(rules) = &self.pull_rules {
            server.pull_rules = rules.clone();
        }
    }
}

/// Result of a connectivity test against a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTest {
    /// `1` means the handshake succeeded; any other value is a failure code.
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConnectionTest {
    /// Status code reported for a successful handshake.
    pub const OK: i64 = 1;

    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: Self::OK,
            message: None,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Self::OK
    }
}
