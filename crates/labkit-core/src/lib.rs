//! labkit Core Library
//!
//! Installation state tracking and uninstall planning for the AI lab
//! environment: pre-install snapshots, durable step status, discovery of
//! installations across volumes, and plan-driven removal that only deletes
//! what the installer created.

pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fs;
pub mod install;
pub mod snapshot;
pub mod status;
pub mod uninstall;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, LabConfig};

    // Errors
    pub use crate::error::{LabError, exit_code_for};

    // Status
    pub use crate::snapshot::{Snapshot, SharedRuntimeProbe};
    pub use crate::status::{InstallMode, InstallationRecord, StatusStore, StepResult, StepStatus};

    // Discovery
    pub use crate::discovery::{DiscoveredInstallation, Discovery, Volume, VolumeEnumerator};

    // Install
    pub use crate::install::{Step, StepContext, StepOrchestrator, StepOutput};

    // Uninstall
    pub use crate::uninstall::{
        Action, ExecutionResult, Ownership, PlanOptions, ResourceItem, UninstallPlan,
    };

    // Commands
    pub use crate::commands::{
        InstallCommand, InstallOptions, UninstallCommand, UninstallOptions, UninstallReport,
    };
}
