//! Installation sequencing.

pub mod orchestrator;
pub mod steps;

pub use orchestrator::{RunSummary, Step, StepContext, StepFailure, StepOrchestrator, StepOutput};
pub use steps::{
    ACTIVATION_SCRIPT, ActivationScript, ComponentStep, INSTALLATION_INFO, InstallationInfo,
    PrepareLayout, default_steps,
};
