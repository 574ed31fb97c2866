//! High-level commands for labkit operations.
//!
//! This module provides the public API the CLI calls for install and
//! uninstall runs.

pub mod install;
pub mod uninstall;

pub use install::{InstallCommand, InstallOptions, InstallReport};
pub use uninstall::{
    NoPrompt, Prompter, UninstallCommand, UninstallOptions, UninstallOutcome, UninstallReport,
};
