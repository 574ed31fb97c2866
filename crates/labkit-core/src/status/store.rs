//! Installation status persistence
//!
//! The primary document lives inside the installation root. A mirror of the
//! most recently saved record is kept in the user's state directory so the
//! uninstaller can find the installation without scanning volumes:
//! - Unix: `$XDG_STATE_HOME/labkit/current_installation.json`
//!   (fallback: `~/.local/share/labkit/…`)
//! - Windows: `%LOCALAPPDATA%\labkit\current_installation.json`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::record::{InstallationRecord, SCHEMA_VERSION};
use crate::error::LabError;

pub const STATUS_FILE_NAME: &str = "installation_status.json";
pub const MIRROR_FILE_NAME: &str = "current_installation.json";

#[derive(Debug, Clone)]
pub struct StatusStore {
    mirror_path: Option<PathBuf>,
}

impl StatusStore {
    /// Default state directory for the mirror copy.
    pub fn default_state_dir() -> anyhow::Result<PathBuf> {
        let base = if cfg!(unix) {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .ok_or_else(|| anyhow::anyhow!("Cannot determine state directory"))?
        } else {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Cannot determine local app data directory"))?
        };
        Ok(base.join("labkit"))
    }

    pub fn with_defaults() -> anyhow::Result<Self> {
        Ok(Self::new(Self::default_state_dir()?))
    }

    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            mirror_path: Some(state_dir.join(MIRROR_FILE_NAME)),
        }
    }

    /// Store that only writes the primary document.
    pub fn without_mirror() -> Self {
        Self { mirror_path: None }
    }

    pub fn status_path(root: &Path) -> PathBuf {
        root.join(STATUS_FILE_NAME)
    }

    pub fn mirror_path(&self) -> Option<&Path> {
        self.mirror_path.as_deref()
    }

    /// Load the record stored under `root`.
    ///
    /// Returns `Ok(None)` when no status document exists.
    pub fn load(&self, root: &Path) -> Result<Option<InstallationRecord>, LabError> {
        let path = Self::status_path(root);
        if !path.exists() {
            return Ok(None);
        }
        let mut record = read_record(&path).map_err(|err| LabError::persistence(&path, err))?;
        if record.root_path.as_os_str().is_empty() {
            record.root_path = root.to_path_buf();
        }
        Ok(Some(record))
    }

    /// Persist `record` to its root and refresh the mirror.
    ///
    /// The primary write is atomic (temp file + rename). A failed mirror
    /// write is logged; the primary document stays authoritative.
    pub fn save(&self, record: &InstallationRecord) -> Result<(), LabError> {
        let path = Self::status_path(&record.root_path);
        let mut stored = record.clone();
        stored.schema_version = SCHEMA_VERSION;
        let bytes = serde_json::to_vec_pretty(&stored)
            .context("Failed to serialize installation record")
            .map_err(|err| LabError::persistence(&path, err))?;

        write_atomic(&path, &bytes).map_err(|err| LabError::persistence(&path, err))?;

        if let Some(mirror) = &self.mirror_path {
            if let Err(err) = write_atomic(mirror, &bytes) {
                tracing::warn!(
                    path = %mirror.display(),
                    error = %format!("{:#}", err),
                    "Failed to update status mirror"
                );
            }
        }
        Ok(())
    }

    /// Mirror record, if one exists and decodes.
    pub fn load_mirror(&self) -> Option<InstallationRecord> {
        let mirror = self.mirror_path.as_ref()?;
        if !mirror.exists() {
            return None;
        }
        match read_record(mirror) {
            Ok(record) if !record.root_path.as_os_str().is_empty() => Some(record),
            Ok(_) => {
                tracing::warn!(path = %mirror.display(), "Status mirror has no root path");
                None
            }
            Err(err) => {
                tracing::warn!(
                    path = %mirror.display(),
                    error = %format!("{:#}", err),
                    "Ignoring unreadable status mirror"
                );
                None
            }
        }
    }

    /// Delete the mirror when it points at `root`.
    pub fn clear_mirror_if(&self, root: &Path) -> anyhow::Result<bool> {
        let Some(mirror) = &self.mirror_path else {
            return Ok(false);
        };
        let Some(record) = self.load_mirror() else {
            return Ok(false);
        };
        if !same_path(&record.root_path, root) {
            return Ok(false);
        }
        fs::remove_file(mirror)
            .with_context(|| format!("Failed to remove status mirror: {}", mirror.display()))?;
        Ok(true)
    }
}

fn read_record(path: &Path) -> anyhow::Result<InstallationRecord> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read status: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse status: {}", path.display()))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Status path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "status".to_string());
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    fs::write(&tmp_path, bytes)
        .with_context(|| format!("Failed to write temp status: {}", tmp_path.display()))?;

    // rename replaces the target in place; never remove the live record first
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err)
            .with_context(|| format!("Failed to move status into place: {}", path.display()));
    }
    Ok(())
}

/// Compare paths by canonical form when both resolve.
pub(crate) fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
