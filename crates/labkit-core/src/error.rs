//! Error taxonomy for install and uninstall runs.
//!
//! Plumbing failures travel as `anyhow::Error` with context. The variants
//! here are the conditions callers branch on: the CLI downcasts to pick an
//! exit code, and the orchestrator/executor record them per step or item.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("No installation found")]
    DiscoveryMiss,

    #[error("Found {count} installations; pass --path to choose one in automatic mode")]
    AmbiguousSelection { count: usize },

    #[error("Snapshot capture failed for {path}: {reason}")]
    SnapshotCaptureFailed { path: PathBuf, reason: String },

    #[error("Failed to persist installation status at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Resource still locked after {attempts} attempts: {path}")]
    ResourceLocked { path: PathBuf, attempts: u32 },

    #[error("Backup failed for {path}: {reason}")]
    BackupFailed { path: PathBuf, reason: String },

    #[error("Verification found {count} discrepancies")]
    VerificationMismatch { count: usize },

    #[error("Operation cancelled by user")]
    Cancelled,
}

impl LabError {
    pub fn persistence(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Recoverable conditions map to exit code 1; everything else is internal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LabError::DiscoveryMiss
                | LabError::AmbiguousSelection { .. }
                | LabError::Cancelled
                | LabError::VerificationMismatch { .. }
        )
    }
}

/// Exit code for an error that escaped to the entry point.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<LabError>() {
        Some(lab) if lab.is_recoverable() => 1,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_exit_with_one() {
        let err = anyhow::Error::new(LabError::DiscoveryMiss);
        assert_eq!(exit_code_for(&err), 1);

        let err = anyhow::Error::new(LabError::AmbiguousSelection { count: 2 });
        assert_eq!(exit_code_for(&err), 1);
    }

    #[test]
    fn persistence_and_plain_errors_exit_with_two() {
        let err = anyhow::Error::new(LabError::persistence(
            "/tmp/status.json",
            anyhow::anyhow!("disk full"),
        ));
        assert_eq!(exit_code_for(&err), 2);
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), 2);
    }

    #[test]
    fn context_wrapped_lab_error_still_downcasts() {
        let err = anyhow::Error::new(LabError::Cancelled).context("while uninstalling");
        assert_eq!(exit_code_for(&err), 1);
    }
}
