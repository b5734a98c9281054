//! Tags and sharing groups: the two visibility layers narrower than
//! distribution level.

use crate::flags::bool_flag;
use crate::{OrgRef, RemoteId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tag definition on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: RemoteId,
    pub name: String,
    /// Non-exportable tags never leave the instance themselves.
    #[serde(default, deserialize_with = "bool_flag")]
    pub exportable: bool,
    /// Owning organisation; `0` means any.
    #[serde(default = "any_org")]
    pub org_id: RemoteId,
}

fn any_org() -> RemoteId {
    RemoteId::from(0)
}

/// Payload for creating a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTag {
    pub name: String,
    pub exportable: bool,
    pub org_id: RemoteId,
}

/// A server taking part in a sharing group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingGroupServer {
    /// Local server record id; `0` is the instance itself.
    pub server_id: RemoteId,
    /// URL of the member server, when the listing includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl SharingGroupServer {
    /// True if this entry stands for the local instance.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.server_id.as_u64() == Some(RemoteId::LOCAL_SERVER)
    }
}

/// A sharing group and its memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingGroup {
    pub id: RemoteId,
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub releasability: String,
    #[serde(default)]
    pub organisations: Vec<OrgRef>,
    #[serde(default)]
    pub servers: Vec<SharingGroupServer>,
}

impl SharingGroup {
    /// True if an organisation with this uuid is a member.
    #[must_use]
    pub fn has_org(&self, org_uuid: &Uuid) -> bool {
        self.organisations
            .iter()
            .any(|org| org.uuid.as_ref() == Some(org_uuid))
    }
}

/// Payload for creating a sharing group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSharingGroup {
    pub name: String,
    pub releasability: String,
}
