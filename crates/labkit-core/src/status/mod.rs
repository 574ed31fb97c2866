//! Durable installation status.

pub mod compat;
pub mod record;
pub mod store;

pub use record::{InstallMode, InstallationRecord, SCHEMA_VERSION, StepResult, StepStatus};
pub use store::{MIRROR_FILE_NAME, STATUS_FILE_NAME, StatusStore};
