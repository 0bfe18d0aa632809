//! Hierarchical outline threaded through the generation pipeline.
//!
//! An [`Outline`] maps onto markdown headings: the title is the single `#`
//! heading, top-level branches are `##`, and each further level of `sub`
//! adds one `#`. [`Depth`] caps the deepest heading level at 2, 3 or 4.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::OutlineError;

/// Maximum heading level permitted for an outline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Depth {
    Two,
    #[default]
    Three,
    Four,
}

impl Depth {
    pub fn as_u8(self) -> u8 {
        match self {
            Depth::Two => 2,
            Depth::Three => 3,
            Depth::Four => 4,
        }
    }
}

impl TryFrom<u8> for Depth {
    type Error = OutlineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Depth::Two),
            3 => Ok(Depth::Three),
            4 => Ok(Depth::Four),
            other => Err(OutlineError::InvalidDepth(other)),
        }
    }
}

impl From<Depth> for u8 {
    fn from(depth: Depth) -> Self {
        depth.as_u8()
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// One branch, sub-branch or leaf of an outline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Node {
    /// Short label rendered as the heading text.
    pub name: String,

    /// Free-text description rendered inline after the heading.
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,

    /// Children, empty at the deepest permitted level.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub sub: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            sub: Vec::new(),
        }
    }

    pub fn with_sub(mut self, sub: Vec<Node>) -> Self {
        self.sub = sub;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.sub.is_empty()
    }
}

/// The mindmap outline prior to markdown rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Outline {
    /// Display name of the topic, rendered as the single `#` heading.
    pub title: String,

    /// Maximum heading depth (2, 3 or 4).
    #[schemars(with = "u8")]
    pub depth: Depth,

    /// Top-level categories in rendering order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub branches: Vec<Node>,
}

impl Outline {
    pub fn new(title: impl Into<String>, depth: Depth) -> Self {
        Self {
            title: title.into(),
            depth,
            branches: Vec::new(),
        }
    }

    pub fn with_branches(mut self, branches: Vec<Node>) -> Self {
        self.branches = branches;
        self
    }

    /// JSON Schema describing the outline, embedded in stage prompts.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Outline)).unwrap_or_default()
    }

    /// Check structural invariants.
    ///
    /// With `require_summaries`, every node must also carry a non-empty
    /// summary (the state expected after leaf enrichment).
    pub fn validate(&self, require_summaries: bool) -> Result<(), OutlineError> {
        if self.title.trim().is_empty() {
            return Err(OutlineError::EmptyTitle);
        }
        if self.branches.is_empty() {
            return Err(OutlineError::NoBranches);
        }
        for (i, branch) in self.branches.iter().enumerate() {
            validate_node(branch, &format!("branches[{i}]"), require_summaries)?;
        }
        Ok(())
    }

    /// Drop nodes that would render deeper than `depth`.
    ///
    /// Returns the number of nodes removed.
    pub fn prune_to_depth(&mut self) -> usize {
        let max_level = self.depth.as_u8();
        self.branches
            .iter_mut()
            .map(|branch| prune_node(branch, 2, max_level))
            .sum()
    }

    /// Heading level of the deepest node (1 when there are no branches).
    pub fn max_level(&self) -> u8 {
        self.branches
            .iter()
            .map(|b| node_level(b, 2))
            .max()
            .unwrap_or(1)
    }

    pub fn node_count(&self) -> usize {
        self.branches.iter().map(count_nodes).sum()
    }

    pub fn leaf_count(&self) -> usize {
        self.branches.iter().map(count_leaves).sum()
    }
}

fn validate_node(node: &Node, path: &str, require_summaries: bool) -> Result<(), OutlineError> {
    if node.name.trim().is_empty() {
        return Err(OutlineError::EmptyName { path: path.into() });
    }
    if require_summaries && node.summary.trim().is_empty() {
        return Err(OutlineError::EmptySummary {
            name: node.name.clone(),
        });
    }
    for (i, child) in node.sub.iter().enumerate() {
        validate_node(child, &format!("{path}.sub[{i}]"), require_summaries)?;
    }
    Ok(())
}

fn prune_node(node: &mut Node, level: u8, max_level: u8) -> usize {
    if level >= max_level {
        let removed = node.sub.iter().map(count_nodes).sum();
        node.sub.clear();
        return removed;
    }
    node.sub
        .iter_mut()
        .map(|child| prune_node(child, level + 1, max_level))
        .sum()
}

fn node_level(node: &Node, level: u8) -> u8 {
    node.sub
        .iter()
        .map(|child| node_level(child, level + 1))
        .max()
        .unwrap_or(level)
}

fn count_nodes(node: &Node) -> usize {
    1 + node.sub.iter().map(count_nodes).sum::<usize>()
}

fn count_leaves(node: &Node) -> usize {
    if node.is_leaf() {
        1
    } else {
        node.sub.iter().map(count_leaves).sum()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
