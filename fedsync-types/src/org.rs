//! Organisations, users and roles.

use crate::flags::bool_flag;
use crate::{Error, RemoteId, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// An organisation as known by one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    /// Id assigned by the instance.
    pub id: RemoteId,
    /// Globally shared uuid; identical on every instance that knows the org.
    pub uuid: Uuid,
    /// Display name, unique per instance.
    pub name: String,
    /// True if the organisation is hosted on this instance.
    #[serde(default, deserialize_with = "bool_flag")]
    pub local: bool,
}

impl Organisation {
    /// Returns a reference usable in payloads sent to other instances.
    #[must_use]
    pub fn to_ref(&self) -> OrgRef {
        OrgRef {
            id: Some(self.id.clone()),
            uuid: Some(self.uuid),
            name: self.name.clone(),
        }
    }
}

/// Payload for creating an organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrganisation {
    pub name: String,
    /// Reuse an existing uuid when the organisation mirrors a remote one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub local: bool,
}

impl NewOrganisation {
    /// An organisation hosted on the instance.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: None,
            local: true,
        }
    }

    /// A non-local organisation representing a remote counterpart.
    #[must_use]
    pub fn remote(org: &Organisation) -> Self {
        Self {
            name: org.name.clone(),
            uuid: Some(org.uuid),
            local: false,
        }
    }
}

/// Lightweight organisation reference embedded in other records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RemoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub name: String,
}

/// Privilege level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    SiteAdmin,
    OrgAdmin,
    /// Regular member; the default role for new users.
    User,
    Publisher,
    /// Account used by a remote instance to push to and pull from this one.
    SyncUser,
    ReadOnly,
}

impl Role {
    /// Role id on a stock instance.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::SiteAdmin => 1,
            Self::OrgAdmin => 2,
            Self::User => 3,
            Self::Publisher => 4,
            Self::SyncUser => 5,
            Self::ReadOnly => 6,
        }
    }

    /// Parses a stock role id.
    pub fn from_id(id: u8) -> Result<Self> {
        Ok(match id {
            1 => Self::SiteAdmin,
            2 => Self::OrgAdmin,
            3 => Self::User,
            4 => Self::Publisher,
            5 => Self::SyncUser,
            6 => Self::ReadOnly,
            other => return Err(Error::InvalidRole(other)),
        })
    }

    /// Short label used in logs and credential exports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SiteAdmin => "site-admin",
            Self::OrgAdmin => "org-admin",
            Self::User => "user",
            Self::Publisher => "publisher",
            Self::SyncUser => "sync-user",
            Self::ReadOnly => "read-only",
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.id())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let id = crate::flags::small_int(deserializer)?;
        Self::from_id(id).map_err(serde::de::Error::custom)
    }
}

/// A user account on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: RemoteId,
    pub email: String,
    pub org_id: RemoteId,
    #[serde(rename = "role_id")]
    pub role: Role,
    pub authkey: String,
    /// Set until the user logs in and chooses a password.
    #[serde(default, deserialize_with = "bool_flag")]
    pub change_pw: bool,
}

/// Payload for creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub org_id: RemoteId,
    #[serde(rename = "role_id")]
    pub role: Role,
}

impl NewUser {
    pub fn new(email: impl Into<String>, org_id: RemoteId, role: Role) -> Self {
        Self {
            email: email.into(),
            org_id,
            role,
        }
    }
}

/// Deterministic email of the sync user created for a counterpart org.
///
/// `"Second org"` becomes `sync_user@second-org.local`.
#[must_use]
pub fn sync_user_email(org_name: &str) -> String {
    let short = org_name.to_lowercase().replace(' ', "-");
    format!("sync_user@{short}.local")
}
