//! Uninstall planning and execution.

pub mod executor;
pub mod plan;
pub mod process;
pub mod runtime_env;
pub mod verify;

pub use executor::{
    Action, Confirm, ExecuteOptions, Execution, ExecutionResult, Executor, FsRemover, Remover,
    RetryPolicy, backup_dir_for,
};
pub use plan::{
    Ownership, PlanBuilder, PlanOptions, PlanScope, ResourceItem, ResourceKind, UninstallPlan,
};
pub use process::{ProcessController, SystemProcesses, quiesce};
pub use runtime_env::{CondaEnvRemover, EnvironmentRemover};
pub use verify::verify;
