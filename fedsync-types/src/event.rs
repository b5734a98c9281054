//! Events, attributes and objects: the fixtures pushed through the graph.
//!
//! Only the fields needed to drive and assert propagation are modelled.

use crate::flags::{bool_flag, optional_id};
use crate::{Distribution, OrgRef, RemoteId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tag reference carried by an event or attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagRef {
    pub name: String,
}

impl TagRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A single indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(default = "inherit")]
    pub distribution: Distribution,
    #[serde(
        default,
        deserialize_with = "optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub sharing_group_id: Option<RemoteId>,
    #[serde(rename = "Tag", default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagRef>,
}

fn inherit() -> Distribution {
    Distribution::Inherit
}

impl Attribute {
    /// A new attribute inheriting its parent's distribution.
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            kind: kind.into(),
            value: value.into(),
            distribution: Distribution::Inherit,
            sharing_group_id: None,
            tags: Vec::new(),
        }
    }

    pub fn set_distribution(&mut self, distribution: Distribution) -> &mut Self {
        self.distribution = distribution;
        self
    }

    /// Scopes the attribute to a sharing group.
    pub fn set_sharing_group(&mut self, sharing_group_id: RemoteId) -> &mut Self {
        self.distribution = Distribution::SharingGroup;
        self.sharing_group_id = Some(sharing_group_id);
        self
    }

    pub fn add_tag(&mut self, name: impl Into<String>) -> &mut Self {
        self.tags.push(TagRef::new(name));
        self
    }
}

/// A structured group of attributes (e.g. a `file` object).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventObject {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default = "inherit")]
    pub distribution: Distribution,
    #[serde(
        default,
        deserialize_with = "optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub sharing_group_id: Option<RemoteId>,
    #[serde(rename = "Attribute", default)]
    pub attributes: Vec<Attribute>,
}

impl EventObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            distribution: Distribution::Inherit,
            sharing_group_id: None,
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(
        &mut self,
        kind: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Attribute {
        self.attributes.push(Attribute::new(kind, value));
        let last = self.attributes.len() - 1;
        &mut self.attributes[last]
    }
}

/// An event with its attributes and objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned by the instance on creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RemoteId>,
    pub uuid: Uuid,
    pub info: String,
    pub distribution: Distribution,
    #[serde(
        default,
        deserialize_with = "optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub sharing_group_id: Option<RemoteId>,
    #[serde(default, deserialize_with = "bool_flag")]
    pub published: bool,
    /// Owning organisation on the instance that returned the event.
    #[serde(rename = "Org", default, skip_serializing_if = "Option::is_none")]
    pub org: Option<OrgRef>,
    /// Creator organisation; identical everywhere the event travelled.
    #[serde(rename = "Orgc", default, skip_serializing_if = "Option::is_none")]
    pub orgc: Option<OrgRef>,
    #[serde(rename = "Tag", default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagRef>,
    #[serde(rename = "Attribute", default)]
    pub attributes: Vec<Attribute>,
    #[serde(rename = "Object", default)]
    pub objects: Vec<EventObject>,
}

impl Event {
    /// A new, unsaved event.
    pub fn new(info: impl Into<String>, distribution: Distribution) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            info: info.into(),
            distribution,
            sharing_group_id: None,
            published: false,
            org: None,
            orgc: None,
            tags: Vec::new(),
            attributes: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn add_tag(&mut self, name: impl Into<String>) -> &mut Self {
        self.tags.push(TagRef::new(name));
        self
    }

    /// Appends an attribute and returns it for further adjustment.
    pub fn add_attribute(
        &mut self,
        kind: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Attribute {
        self.attributes.push(Attribute::new(kind, value));
        let last = self.attributes.len() - 1;
        &mut self.attributes[last]
    }

    pub fn add_object(&mut self, object: EventObject) -> &mut Self {
        self.objects.push(object);
        self
    }

    /// True if the event carries a tag with this name.
    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name == name)
    }

    /// Number of object attributes across every object.
    #[must_use]
    pub fn object_attribute_count(&self) -> usize {
        self.objects.iter().map(|o| o.attributes.len()).sum()
    }
}
