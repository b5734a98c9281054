//! Sync topologies as data.
//!
//! An [`EdgeSpec`] says that `holder` keeps a server record pointing at
//! `peer`, authenticated as a sync user that `peer` hosts for the holder's
//! organisation. The holder can then pull from the peer and, once push is
//! enabled on the record, push to it.

use std::collections::BTreeSet;
use std::fmt;

/// One directed sync relationship.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeSpec {
    pub holder: String,
    pub peer: String,
}

impl EdgeSpec {
    pub fn new(holder: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            peer: peer.into(),
        }
    }
}

impl fmt::Display for EdgeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.holder, self.peer)
    }
}

/// A set of directed edges, kept in insertion order without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    edges: Vec<EdgeSpec>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge. Returns false for self-loops and edges already present.
    pub fn add(&mut self, holder: impl Into<String>, peer: impl Into<String>) -> bool {
        let edge = EdgeSpec::new(holder, peer);
        if edge.holder == edge.peer || self.edges.contains(&edge) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Builder form of [`Topology::add`].
    #[must_use]
    pub fn with_edge(mut self, holder: impl Into<String>, peer: impl Into<String>) -> Self {
        self.add(holder, peer);
        self
    }

    /// Every spoke holds a record of the hub.
    pub fn star<S: Into<String>>(hub: &str, spokes: impl IntoIterator<Item = S>) -> Self {
        let mut topology = Self::new();
        for spoke in spokes {
            topology.add(spoke, hub);
        }
        topology
    }

    /// Every member holds a record of every other member.
    pub fn mesh<S: Into<String>>(members: impl IntoIterator<Item = S>) -> Self {
        let members: Vec<String> = members.into_iter().map(Into::into).collect();
        let mut topology = Self::new();
        for peer in &members {
            for holder in &members {
                topology.add(holder.as_str(), peer.as_str());
            }
        }
        topology
    }

    /// Union of both topologies; edges of `self` come first.
    #[must_use]
    pub fn merge(mut self, other: Topology) -> Self {
        for edge in other.edges {
            self.add(edge.holder, edge.peer);
        }
        self
    }

    pub fn edges(&self) -> impl Iterator<Item = &EdgeSpec> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains(&self, holder: &str, peer: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.holder == holder && e.peer == peer)
    }

    /// Names of all instances appearing in the topology.
    pub fn instances(&self) -> BTreeSet<&str> {
        self.edges
            .iter()
            .flat_map(|e| [e.holder.as_str(), e.peer.as_str()])
            .collect()
    }
}
