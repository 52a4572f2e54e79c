use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CurationError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed node at {0}")]
    MalformedNode(NodeIssue),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CurationError>;

/// A single document element that could not be decoded or resolved.
///
/// Issues are collected next to a result instead of failing it, so one bad
/// subtree never hides the rest of the gene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIssue {
    pub path: String,
    pub reason: String,
}

impl NodeIssue {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { path: path.into(), reason: reason.into() }
    }
}

impl fmt::Display for NodeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}
