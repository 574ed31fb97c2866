//! Installation record types.
//!
//! One record per installation instance. The schema is additive-only:
//! every field carries a default so documents from older installers decode.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::compat;
use crate::snapshot::Snapshot;

/// Current record schema version. Documents without the field are version 1.
pub const SCHEMA_VERSION: u32 = 2;

fn legacy_schema_version() -> u32 {
    1
}

/// Where the installation root sits on its volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// `<volume>/<lab_dir>/<root_dir>`, used on external drives.
    #[default]
    #[serde(alias = "student", alias = "external_nested")]
    Nested,
    /// `<volume>/<root_dir>` next to the lab checkout.
    #[serde(alias = "standalone", alias = "internal_side_by_side")]
    SideBySide,
}

impl InstallMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InstallMode::Nested => "nested",
            InstallMode::SideBySide => "side-by-side",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    #[serde(alias = "in_progress")]
    Running,
    #[serde(alias = "completed")]
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "compat::lenient_datetime")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "compat::lenient_datetime")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Absolute paths the step reported creating.
    pub created_paths: Vec<PathBuf>,
}

impl Default for StepResult {
    fn default() -> Self {
        Self::pending("")
    }
}

impl StepResult {
    pub fn pending(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Pending,
            error: None,
            started_at: None,
            completed_at: None,
            created_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallationRecord {
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,

    #[serde(alias = "installation_id")]
    pub id: String,

    #[serde(alias = "installation_path")]
    pub root_path: PathBuf,

    #[serde(alias = "installation_drive")]
    pub volume: String,

    pub mode: InstallMode,

    #[serde(alias = "start_time", with = "compat::lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(alias = "last_update", with = "compat::lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub installer_location: Option<PathBuf>,

    #[serde(deserialize_with = "compat::deserialize_steps")]
    pub completed_steps: Vec<StepResult>,

    #[serde(alias = "pre_install_state")]
    pub snapshot: Snapshot,
}

impl Default for InstallationRecord {
    fn default() -> Self {
        Self {
            schema_version: legacy_schema_version(),
            id: String::new(),
            root_path: PathBuf::new(),
            volume: String::new(),
            mode: InstallMode::default(),
            created_at: None,
            updated_at: None,
            installer_location: None,
            completed_steps: Vec::new(),
            snapshot: Snapshot::empty(),
        }
    }
}

impl InstallationRecord {
    /// Fresh record for a new installation. The id is derived from the
    /// creation time.
    pub fn new(
        root_path: PathBuf,
        volume: impl Into<String>,
        mode: InstallMode,
        snapshot: Snapshot,
    ) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            id: now.format("%Y%m%d_%H%M%S").to_string(),
            root_path,
            volume: volume.into(),
            mode,
            created_at: Some(now),
            updated_at: Some(now),
            installer_location: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|p| p.to_path_buf())),
            completed_steps: Vec::new(),
            snapshot,
        }
    }

    /// Record reconstructed from the filesystem alone, with no stored
    /// history or snapshot.
    pub fn filesystem_only(
        root_path: PathBuf,
        volume: impl Into<String>,
        mode: InstallMode,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            id: "unknown".to_string(),
            root_path,
            volume: volume.into(),
            mode,
            ..Self::default()
        }
    }

    /// Stored result for a step, matching either its id or the legacy
    /// positional id (1-based) used by old records.
    pub fn step(&self, step_id: &str, position: usize) -> Option<&StepResult> {
        let legacy = compat::legacy_step_id(position);
        self.completed_steps
            .iter()
            .find(|r| r.step_id == step_id)
            .or_else(|| self.completed_steps.iter().find(|r| r.step_id == legacy))
    }

    pub fn step_succeeded(&self, step_id: &str, position: usize) -> bool {
        self.step(step_id, position)
            .is_some_and(|r| r.status == StepStatus::Succeeded)
    }

    /// Insert or replace the result for `result.step_id`, keeping order.
    pub fn upsert_step(&mut self, result: StepResult) {
        match self
            .completed_steps
            .iter_mut()
            .find(|r| r.step_id == result.step_id)
        {
            Some(existing) => *existing = result,
            None => self.completed_steps.push(result),
        }
    }

    pub fn failed_step(&self) -> Option<&StepResult> {
        self.completed_steps
            .iter()
            .find(|r| r.status == StepStatus::Failed)
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}
