//! Distribution levels and the rules for carrying them across a sync hop.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Visibility policy attached to events, attributes and objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Distribution {
    /// Only the owning organisation sees the data.
    YourOrganisationOnly,
    /// Every organisation on the instance.
    ThisCommunityOnly,
    /// The instance and the instances directly connected to it.
    ConnectedCommunities,
    /// Everyone reachable through sync.
    #[default]
    AllCommunities,
    /// Members of the referenced sharing group only.
    SharingGroup,
    /// Attributes and objects only: use the parent's level.
    Inherit,
}

impl Distribution {
    /// Numeric level used on the wire.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::YourOrganisationOnly => 0,
            Self::ThisCommunityOnly => 1,
            Self::ConnectedCommunities => 2,
            Self::AllCommunities => 3,
            Self::SharingGroup => 4,
            Self::Inherit => 5,
        }
    }

    /// Parses a numeric level.
    pub fn from_level(level: u8) -> Result<Self> {
        Ok(match level {
            0 => Self::YourOrganisationOnly,
            1 => Self::ThisCommunityOnly,
            2 => Self::ConnectedCommunities,
            3 => Self::AllCommunities,
            4 => Self::SharingGroup,
            5 => Self::Inherit,
            other => return Err(Error::InvalidDistribution(other)),
        })
    }

    /// Replaces `Inherit` with the parent's (already resolved) level.
    #[must_use]
    pub fn resolve(self, parent: Distribution) -> Distribution {
        match self {
            Self::Inherit => parent,
            other => other,
        }
    }

    /// Level stored by the receiving instance after one sync hop.
    ///
    /// Connected communities become this-community-only and
    /// this-community-only becomes own-organisation-only; the remaining
    /// levels are carried unchanged.
    #[must_use]
    pub fn after_hop(self) -> Distribution {
        match self {
            Self::ThisCommunityOnly => Self::YourOrganisationOnly,
            Self::ConnectedCommunities => Self::ThisCommunityOnly,
            other => other,
        }
    }

    /// Whether data at this (resolved) level may be pushed to another
    /// instance at all. Sharing-group data additionally needs membership.
    #[must_use]
    pub fn is_pushable(self) -> bool {
        matches!(
            self,
            Self::ConnectedCommunities | Self::AllCommunities | Self::SharingGroup
        )
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::YourOrganisationOnly => "your-organisation-only",
            Self::ThisCommunityOnly => "this-community-only",
            Self::ConnectedCommunities => "connected-communities",
            Self::AllCommunities => "all-communities",
            Self::SharingGroup => "sharing-group",
            Self::Inherit => "inherit",
        };
        f.write_str(name)
    }
}

impl Serialize for Distribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.level())
    }
}

impl<'de> Deserialize<'de> for Distribution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let level = crate::flags::small_int(deserializer)?;
        Self::from_level(level).map_err(serde::de::Error::custom)
    }
}
