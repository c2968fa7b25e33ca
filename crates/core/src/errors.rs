//! Error types for the editmerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. Callers
//! that need a single error type wrap them with `anyhow`.
//!
//! A merge conflict is never an error: it is reported as
//! [`MergeOutcome::Conflicting`](crate::conflict::MergeOutcome::Conflicting).
//! [`MergeError`] only describes infrastructure failures, which the engine
//! turns into [`MergeOutcome::Failed`](crate::conflict::MergeOutcome::Failed).

use thiserror::Error;

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

/// Reasons a three-way merge could not be computed at all.
#[derive(Debug, Error)]
pub enum MergeError {
    /// No diff3 path configured.
    #[error("diff3 path is not configured")]
    Diff3NotConfigured,

    /// The configured diff3 binary does not exist.
    #[error("diff3 not found at '{0}'")]
    Diff3NotFound(String),

    /// Creating, writing or removing the scoped input files failed.
    #[error("merge scratch file error: {0}")]
    Scratch(#[source] std::io::Error),

    /// The diff3 process could not be launched or waited on.
    #[error("failed to run diff3: {0}")]
    Spawn(#[source] std::io::Error),

    /// diff3 reported trouble (exit status 2 or killed by a signal).
    #[error("diff3 failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// diff3 did not finish within the configured timeout.
    #[error("diff3 timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// diff3 produced no output at all for a non-empty base.
    #[error("diff3 returned an empty result for a non-empty base")]
    UnexpectedEmptyResult,
}

// ---------------------------------------------------------------------------
// Revision store errors
// ---------------------------------------------------------------------------

/// Errors from a [`RevisionStore`](crate::store::RevisionStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The page has no revisions at all.
    #[error("page not found: {0}")]
    PageNotFound(String),

    /// The page exists but has no revision with the given timestamp.
    #[error("revision {timestamp} of page '{page_id}' not found")]
    RevisionNotFound { page_id: String, timestamp: u64 },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// TOML serialization error.
    #[error("configuration serialize error: {0}")]
    SerializeError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = MergeError::Diff3NotFound("/opt/diff3".into());
        assert_eq!(err.to_string(), "diff3 not found at '/opt/diff3'");

        let err = MergeError::Timeout(std::time::Duration::from_secs(10));
        assert_eq!(err.to_string(), "diff3 timed out after 10s");

        let err = StoreError::RevisionNotFound {
            page_id: "wiki:start".into(),
            timestamp: 42,
        };
        assert!(err.to_string().contains("wiki:start"));

        let err = ConfigError::InvalidValue {
            field: "diff3.timeout_secs".into(),
            detail: "must be > 0".into(),
        };
        assert!(err.to_string().contains("diff3.timeout_secs"));
    }
}
