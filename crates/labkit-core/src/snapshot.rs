//! Pre-install snapshot capture.
//!
//! Runs once, before the first installation step and before the installation
//! root is created. The snapshot is the only evidence the uninstaller has of
//! what predates the installation, so a failed capture degrades to the empty
//! snapshot instead of stopping the install.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SharedRuntimeConfig;
use crate::error::LabError;
use crate::status::compat;

/// Immutable record of the state observed before installation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// `None` when the record predates snapshots or was never captured.
    #[serde(with = "compat::lenient_datetime")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(alias = "target_drive")]
    pub target_volume: String,

    #[serde(alias = "ai_env_existed")]
    pub existed_before: bool,

    /// Top-level names under the root that predate the installation.
    #[serde(alias = "existing_subdirs")]
    pub existing_subdirectories: BTreeSet<String>,

    #[serde(alias = "conda_installations")]
    pub shared_runtime: SharedRuntimeState,

    #[serde(alias = "python_in_path")]
    pub system_interpreter_on_path: bool,

    /// Reason the capture degraded to the empty snapshot.
    #[serde(alias = "error", skip_serializing_if = "Option::is_none")]
    pub capture_error: Option<String>,
}

/// Pre-existing installations of the shared runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedRuntimeState {
    /// A portable copy already inside the installation root.
    #[serde(alias = "portable_path")]
    pub portable: Option<PathBuf>,
    /// A systemwide copy outside the installation root.
    #[serde(alias = "allusers_path")]
    pub shared: Option<PathBuf>,
}

impl Snapshot {
    /// Snapshot used when none was recorded. Plan building treats every
    /// entry as installer-created.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this snapshot carries real observations.
    pub fn is_captured(&self) -> bool {
        self.timestamp.is_some() && self.capture_error.is_none()
    }

    pub fn predates(&self, name: &str) -> bool {
        self.existing_subdirectories.contains(name)
    }
}

/// Reports known install locations of the shared runtime.
///
/// Supplied by the shared-runtime collaborator.
pub trait SharedRuntimeProbe {
    /// Portable runtime inside `root`, if one is installed there.
    fn portable(&self, root: &Path) -> Option<PathBuf>;

    /// Systemwide runtime, if one is installed.
    fn shared(&self) -> Option<PathBuf>;

    fn interpreter_on_path(&self) -> bool {
        which::which("python").is_ok() || which::which("python3").is_ok()
    }
}

/// Probe for a conda-style runtime, driven by `[shared_runtime]` config.
#[derive(Debug, Clone)]
pub struct CondaProbe {
    config: SharedRuntimeConfig,
    home_dir: Option<PathBuf>,
}

impl CondaProbe {
    pub fn new(config: SharedRuntimeConfig) -> Self {
        Self {
            config,
            home_dir: dirs::home_dir(),
        }
    }

    pub fn with_home_dir(config: SharedRuntimeConfig, home_dir: Option<PathBuf>) -> Self {
        Self { config, home_dir }
    }

    fn expand(&self, location: &Path) -> Option<PathBuf> {
        match location.strip_prefix("~") {
            Ok(rest) => self.home_dir.as_ref().map(|home| home.join(rest)),
            Err(_) => Some(location.to_path_buf()),
        }
    }

    fn has_runtime(&self, candidate: &Path) -> bool {
        self.config
            .executables
            .iter()
            .any(|exe| candidate.join(exe).is_file())
    }
}

impl SharedRuntimeProbe for CondaProbe {
    fn portable(&self, root: &Path) -> Option<PathBuf> {
        let candidate = root.join(&self.config.portable_dir);
        self.has_runtime(&candidate).then_some(candidate)
    }

    fn shared(&self) -> Option<PathBuf> {
        self.config
            .shared_locations
            .iter()
            .filter_map(|location| self.expand(location))
            .find(|candidate| self.has_runtime(candidate))
    }
}

/// Inspect `root` and the environment. Pure read.
pub fn capture(
    root: &Path,
    volume: &str,
    probe: &dyn SharedRuntimeProbe,
) -> anyhow::Result<Snapshot> {
    let existed_before = root.is_dir();
    let mut existing_subdirectories = BTreeSet::new();

    if existed_before {
        let entries = std::fs::read_dir(root)
            .with_context(|| format!("Failed to enumerate root: {}", root.display()))?;
        for entry in entries {
            let entry =
                entry.with_context(|| format!("Failed to read entry under {}", root.display()))?;
            existing_subdirectories.insert(entry.file_name().to_string_lossy().to_string());
        }
    } else if root.exists() {
        anyhow::bail!("Installation root exists but is not a directory");
    }

    let shared_runtime = SharedRuntimeState {
        portable: if existed_before {
            probe.portable(root)
        } else {
            None
        },
        shared: probe.shared(),
    };

    Ok(Snapshot {
        timestamp: Some(Utc::now()),
        target_volume: volume.to_string(),
        existed_before,
        existing_subdirectories,
        shared_runtime,
        system_interpreter_on_path: probe.interpreter_on_path(),
        capture_error: None,
    })
}

/// Capture, degrading to a conservative empty snapshot on failure.
pub fn capture_or_empty(root: &Path, volume: &str, probe: &dyn SharedRuntimeProbe) -> Snapshot {
    match capture(root, volume, probe) {
        Ok(snapshot) => {
            tracing::info!(
                root = %root.display(),
                existed_before = snapshot.existed_before,
                existing = snapshot.existing_subdirectories.len(),
                "Captured pre-install snapshot"
            );
            snapshot
        }
        Err(err) => {
            let err = LabError::SnapshotCaptureFailed {
                path: root.to_path_buf(),
                reason: format!("{:#}", err),
            };
            tracing::warn!(error = %err, "Continuing with empty snapshot");
            Snapshot {
                timestamp: Some(Utc::now()),
                target_volume: volume.to_string(),
                capture_error: Some(err.to_string()),
                ..Snapshot::empty()
            }
        }
    }
}
