use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a campus graph node (e.g. "P14").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One node as it appears in the bundled campus data file.
///
/// Adjacency in the data file is not guaranteed to be symmetric; the
/// registry symmetrizes it on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub adjacent: Vec<NodeId>,
    #[serde(default)]
    pub exit_node: bool,
    #[serde(default)]
    pub name: String,
}

/// An immutable campus graph node after registry validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub adjacent: BTreeSet<NodeId>,
    pub is_exit: bool,
    pub name: String,
}

impl Node {
    pub fn is_adjacent_to(&self, other: &NodeId) -> bool {
        self.adjacent.contains(other)
    }
}
