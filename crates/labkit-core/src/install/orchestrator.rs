//! Ordered installation steps with persisted progress.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::LabConfig;
use crate::status::{InstallMode, InstallationRecord, StatusStore, StepResult, StepStatus};

/// What a step sees of the installation it runs against.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub root: &'a Path,
    pub volume: &'a str,
    pub mode: InstallMode,
    pub installation_id: &'a str,
    pub config: &'a LabConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    /// Absolute paths the step created.
    pub created_paths: Vec<PathBuf>,
}

impl StepOutput {
    pub fn created(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            created_paths: paths.into_iter().collect(),
        }
    }
}

/// One unit of installation work.
///
/// Steps must not assume any ordering beyond the sequence they are given in.
pub trait Step {
    fn id(&self) -> &str;
    fn description(&self) -> &str;
    fn run(&self, ctx: &StepContext<'_>) -> anyhow::Result<StepOutput>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub executed: Vec<String>,
    /// Steps not run because they precede the start step or already succeeded.
    pub skipped: Vec<String>,
    pub failed: Option<StepFailure>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.failed.is_none()
    }
}

pub struct StepOrchestrator<'a> {
    store: &'a StatusStore,
    config: &'a LabConfig,
}

impl<'a> StepOrchestrator<'a> {
    pub fn new(store: &'a StatusStore, config: &'a LabConfig) -> Self {
        Self { store, config }
    }

    /// Run `steps` against `record`, saving after every status transition.
    ///
    /// `start_step` is 1-based. Without it the run resumes at the first step
    /// the record does not show as succeeded. A failing step halts the run
    /// and is reported in the summary; a failed save aborts with
    /// [`crate::error::LabError::Persistence`].
    pub fn run(
        &self,
        record: &mut InstallationRecord,
        steps: &[Box<dyn Step>],
        start_step: Option<usize>,
    ) -> anyhow::Result<RunSummary> {
        let start = match start_step {
            Some(n) if n == 0 || n > steps.len() => {
                anyhow::bail!("Step {} is out of range (1-{})", n, steps.len())
            }
            Some(n) => n - 1,
            None => steps
                .iter()
                .enumerate()
                .position(|(i, step)| !record.step_succeeded(step.id(), i + 1))
                .unwrap_or(steps.len()),
        };

        let mut summary = RunSummary {
            skipped: steps[..start].iter().map(|s| s.id().to_string()).collect(),
            ..RunSummary::default()
        };
        if start == steps.len() {
            tracing::info!(root = %record.root_path.display(), "All steps already completed");
            return Ok(summary);
        }

        for (index, step) in steps.iter().enumerate().skip(start) {
            let step_id = step.id().to_string();
            tracing::info!(
                step = %step_id,
                position = index + 1,
                total = steps.len(),
                "{}",
                step.description()
            );

            let mut result = StepResult {
                status: StepStatus::Running,
                started_at: Some(Utc::now()),
                ..StepResult::pending(step_id.clone())
            };
            self.transition(record, &result)?;

            let root = record.root_path.clone();
            let volume = record.volume.clone();
            let id = record.id.clone();
            let ctx = StepContext {
                root: &root,
                volume: &volume,
                mode: record.mode,
                installation_id: &id,
                config: self.config,
            };

            match step.run(&ctx) {
                Ok(output) => {
                    result.status = StepStatus::Succeeded;
                    result.completed_at = Some(Utc::now());
                    result.created_paths = output.created_paths;
                    self.transition(record, &result)?;
                    summary.executed.push(step_id);
                }
                Err(err) => {
                    let message = format!("{:#}", err);
                    tracing::error!(step = %step_id, error = %message, "Step failed");
                    result.status = StepStatus::Failed;
                    result.completed_at = Some(Utc::now());
                    result.error = Some(message.clone());
                    self.transition(record, &result)?;
                    summary.failed = Some(StepFailure {
                        step_id,
                        error: message,
                    });
                    break;
                }
            }
        }

        Ok(summary)
    }

    fn transition(
        &self,
        record: &mut InstallationRecord,
        result: &StepResult,
    ) -> anyhow::Result<()> {
        record.upsert_step(result.clone());
        record.touch();
        if let Err(err) = self.store.save(record) {
            let mut failed = result.clone();
            failed.status = StepStatus::Failed;
            failed.error = Some(format!("Failed to persist progress: {}", err));
            record.upsert_step(failed);
            return Err(anyhow::Error::new(err));
        }
        Ok(())
    }
}
