//! Push/pull filter rules attached to a sync server record.
//!
//! Wire shape:
//! `{"tags": {"OR": [..], "NOT": [..]}, "orgs": {"OR": [..], "NOT": [..]}}`,
//! stored on the record as a JSON-encoded string.

use crate::RemoteId;
use serde::{Deserialize, Serialize};

/// Allow/deny lists for one dimension (tags or organisations).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(rename = "OR", default)]
    pub or: Vec<RemoteId>,
    #[serde(rename = "NOT", default)]
    pub not: Vec<RemoteId>,
}

impl RuleSet {
    /// True if neither list constrains anything.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.or.is_empty() && self.not.is_empty()
    }

    /// Evaluates the set against the ids carried by a piece of content.
    ///
    /// Content passes when it carries none of the `NOT` ids and, if `OR` is
    /// non-empty, at least one of the `OR` ids.
    #[must_use]
    pub fn admits<'a>(&self, carried: impl IntoIterator<Item = &'a RemoteId> + Clone) -> bool {
        if carried.clone().into_iter().any(|id| self.not.contains(id)) {
            return false;
        }
        self.or.is_empty() || carried.into_iter().any(|id| self.or.contains(id))
    }
}

/// Filter applied to content crossing a sync edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRules {
    #[serde(default)]
    pub tags: RuleSet,
    #[serde(default)]
    pub orgs: RuleSet,
}

impl FilterRules {
    /// Only content tagged with `tag_id` passes; no organisation constraint.
    #[must_use]
    pub fn tags_only(tag_id: RemoteId) -> Self {
        Self {
            tags: RuleSet {
                or: vec![tag_id],
                not: Vec::new(),
            },
            orgs: RuleSet::default(),
        }
    }

    /// True if the rules let everything through.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.tags.is_open() && self.orgs.is_open()
    }
}

/// (De)serializes [`FilterRules`] as the JSON string the REST API expects.
///
/// Deserialization also accepts an inline object and treats an empty string
/// or `null` as open rules.
pub mod rules_as_string {
    use super::FilterRules;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Encoded(String),
        Inline(FilterRules),
    }

    fn decode<E: serde::de::Error>(raw: Option<Raw>) -> Result<FilterRules, E> {
        match raw {
            None => Ok(FilterRules::default()),
            Some(Raw::Inline(rules)) => Ok(rules),
            Some(Raw::Encoded(s)) if s.trim().is_empty() || s.trim() == "[]" => {
                Ok(FilterRules::default())
            }
            Some(Raw::Encoded(s)) => serde_json::from_str(&s).map_err(E::custom),
        }
    }

    pub fn serialize<S: Serializer>(rules: &FilterRules, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = serde_json::to_string(rules).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FilterRules, D::Error> {
        decode(Option::<Raw>::deserialize(deserializer)?)
    }

    pub mod optional {
        use super::{FilterRules, Raw, decode};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            rules: &Option<FilterRules>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match rules {
                Some(rules) => super::serialize(rules, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<FilterRules>, D::Error> {
            match Option::<Raw>::deserialize(deserializer)? {
                None => Ok(None),
                raw => decode(raw).map(Some),
            }
        }
    }
}
