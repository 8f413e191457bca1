//! Error handling for the PlotMirror-RS library
//!
//! This module defines the error type shared by the mirror, the transport
//! contract and the connection supervisor, plus a Result alias.

use crate::types::{NodeId, NodePath};
use thiserror::Error;

/// Main error type for PlotMirror-RS operations
#[derive(Error, Debug)]
pub enum MirrorError {
    /// No live node is registered at this path
    #[error("No node at path {0}")]
    NotFound(NodePath),

    /// An arena handle whose node has been removed
    #[error("Node {0} is no longer mirrored")]
    StaleHandle(NodeId),

    /// A live node already occupies this path
    #[error("Path {0} is already registered")]
    DuplicatePath(NodePath),

    /// A node was constructed without what it needs (e.g. a root group without a proxy)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A remote call did not answer within its bound
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The remote side reported a failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// The node at this path carries no plot binding
    #[error("Node {0} has no plot")]
    NotPlottable(NodePath),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Errors related to configuration loading/saving
    #[error("Config file error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<MirrorError>,
    },
}

impl MirrorError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        MirrorError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers and return the underlying error
    pub fn root(&self) -> &MirrorError {
        match self {
            MirrorError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// True if the underlying error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), MirrorError::Timeout(_))
    }

    /// True if the underlying error is a missing path
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), MirrorError::NotFound(_))
    }
}

/// Result type alias for PlotMirror-RS operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MirrorError::NotFound(NodePath::from(["run1.h5", "trace"]));
        assert_eq!(err.to_string(), "No node at path run1.h5/trace");
    }

    #[test]
    fn test_error_with_context() {
        let err = MirrorError::Remote("boom".to_string());
        let with_ctx = err.with_context("Failed to sync run1.h5");
        assert!(with_ctx.to_string().contains("Failed to sync run1.h5"));
        assert!(with_ctx.to_string().contains("boom"));
    }

    #[test]
    fn test_stale_handle_names_the_handle() {
        let err = MirrorError::StaleHandle(NodeId(5));
        assert_eq!(err.to_string(), "Node NodeId(5) is no longer mirrored");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_root_sees_through_context() {
        let err = MirrorError::Timeout("hello".to_string())
            .with_context("probe")
            .with_context("supervisor");
        assert!(err.is_timeout());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_result_ext_lazy_context() {
        let res: Result<()> = Err(MirrorError::NotFound(NodePath::from(["a"])));
        let err = ResultExt::with_context(res, || "looking up a".to_string()).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("looking up a"));
    }
}
