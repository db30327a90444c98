//! Error types for the control plane.

use thiserror::Error;

/// Result type alias for control-plane operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the control plane.
#[derive(Error, Debug)]
pub enum Error {
    /// Placement engine errors.
    #[error("placement error: {0}")]
    Placement(#[from] PlacementError),

    /// Revisioned-state errors.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// A transient I/O failure against an external collaborator.
    ///
    /// These are retried at the component that produced them and are not
    /// expected to cross the public surface.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A function definition or config mutation failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A single-node topology change named a node other than this one.
    #[error("node receiving prepare request isn't part of the cluster")]
    NotInCluster,

    /// The producer supervisor reported a failure the coordinator cannot
    /// compensate for.
    #[error("unrecoverable: {0}")]
    Unrecoverable(String),

    /// Configuration errors at process start.
    #[error("config error: {0}")]
    Config(String),

    /// A conflicting operation is already in progress.
    #[error("conflicting operation in progress: {0}")]
    Conflict(String),

    /// The operation was cancelled. Cooperative, not a failure.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// True for failures that the retry primitive should absorb.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

/// Placement engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// No candidate nodes were supplied.
    #[error("no candidate nodes for vbucket assignment")]
    EmptyCluster,

    /// The requested worker count is zero.
    #[error("worker count must be at least 1")]
    ZeroWorkers,
}

/// Revisioned-state errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A task cancellation named a task this node doesn't know.
    #[error("no task with id {0}")]
    TaskNotFound(String),

    /// The caller's revision no longer matches the task it wants to cancel.
    #[error("revision mismatch for task {0}")]
    RevMismatch(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Transient(format!("json: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Transient("io".into()).is_transient());
        assert!(!Error::NotInCluster.is_transient());
        assert!(!Error::InvalidConfig("bad".into()).is_transient());
    }

    #[test]
    fn test_display_carries_reason() {
        let err = Error::InvalidConfig("Source bucket name should not be empty".into());
        assert_eq!(
            err.to_string(),
            "invalid config: Source bucket name should not be empty"
        );
    }
}
