//! Core data types for PlotMirror-RS
//!
//! This module contains the fundamental data structures shared by the
//! mirror, the transport contract and the display contracts.
//!
//! # Main Types
//!
//! - [`NodePath`] - Hierarchical path, the sole identity of a mirrored node
//! - [`NodeId`] - Arena handle for a live node inside a [`crate::mirror::Mirror`]
//! - [`Attrs`] - String-keyed attribute map carried by every node
//! - [`DataBuffer`] - Materialized n-dimensional dataset content
//! - [`ConnectionStatus`] - State of the data server session

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Separator used when rendering a path as a string
pub const PATH_SEPARATOR: char = '/';

/// Attribute value as carried over the wire
pub type AttrValue = serde_json::Value;

/// Attribute map of a node
pub type Attrs = BTreeMap<String, AttrValue>;

/// Fully materialized content of a dataset
pub type DataBuffer = ndarray::ArrayD<f64>;

/// Attribute flag marking a dataset as parametric (rows of `[coords.., value]`)
pub const PARAMETRIC_ATTR: &str = "parametric";

/// Read a boolean flag from an attribute map, treating absence as `false`
pub fn attr_flag(attrs: &Attrs, key: &str) -> bool {
    match attrs.get(key) {
        Some(AttrValue::Bool(b)) => *b,
        Some(AttrValue::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        _ => false,
    }
}

/// Ordered, non-empty sequence of name segments identifying a mirrored node.
///
/// A root node has a single segment; a child's path is its parent's path
/// plus its own name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodePath(Vec<String>);

impl NodePath {
    /// Path of a top-level (parentless) node
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Path of a child of this node
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// The node's own name (last segment)
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    /// Path of the parent, `None` for roots
    pub fn parent(&self) -> Option<NodePath> {
        if self.0.len() > 1 {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        } else {
            None
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", PATH_SEPARATOR)?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl<const N: usize> From<[&str; N]> for NodePath {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<String>> for NodePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

/// Arena handle for a live node. Ids are never reused within a mirror.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Represents the connection status to the data server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No live session
    #[default]
    Disconnected,
    /// Session being established
    Connecting,
    /// Session established and answering liveness probes
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Not Connected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_child_and_parent() {
        let root = NodePath::root("run1.h5");
        let child = root.child("trace");
        assert_eq!(child.len(), 2);
        assert_eq!(child.name(), "trace");
        assert_eq!(child.parent(), Some(root.clone()));
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_path_display() {
        let path = NodePath::from(["run1.h5", "sweeps", "trace"]);
        assert_eq!(path.to_string(), "run1.h5/sweeps/trace");
        assert_eq!(NodePath::root("run1.h5").to_string(), "run1.h5");
    }

    #[test]
    fn test_attr_flag() {
        let mut attrs = Attrs::new();
        assert!(!attr_flag(&attrs, PARAMETRIC_ATTR));
        attrs.insert(PARAMETRIC_ATTR.to_string(), json!(true));
        assert!(attr_flag(&attrs, PARAMETRIC_ATTR));
        attrs.insert(PARAMETRIC_ATTR.to_string(), json!(0));
        assert!(!attr_flag(&attrs, PARAMETRIC_ATTR));
        attrs.insert(PARAMETRIC_ATTR.to_string(), json!("yes"));
        assert!(!attr_flag(&attrs, PARAMETRIC_ATTR));
    }

    #[test]
    fn test_connection_status_display() {
        assert_eq!(ConnectionStatus::Disconnected.to_string(), "Not Connected");
        assert_eq!(ConnectionStatus::Connected.to_string(), "Connected");
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
    }
}
