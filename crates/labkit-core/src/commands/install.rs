//! Install command implementation.
//!
//! Resolves the installation root from the target volume and layout,
//! captures the pre-install snapshot on first run, then drives the step
//! sequence.

use std::path::PathBuf;

use crate::config::LabConfig;
use crate::install::{RunSummary, Step, StepOrchestrator, default_steps};
use crate::snapshot::{CondaProbe, SharedRuntimeProbe, capture_or_empty};
use crate::status::store::same_path;
use crate::status::{InstallMode, InstallationRecord, StatusStore};

/// Options for the install command
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Mount point of the target volume
    pub volume: PathBuf,
    pub mode: InstallMode,
    /// 1-based step to start from; `None` resumes after the last success
    pub start_step: Option<usize>,
}

impl InstallOptions {
    pub fn new(volume: impl Into<PathBuf>) -> Self {
        Self {
            volume: volume.into(),
            mode: InstallMode::Nested,
            start_step: None,
        }
    }

    pub fn with_mode(mut self, mode: InstallMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_start_step(mut self, step: usize) -> Self {
        self.start_step = Some(step);
        self
    }
}

/// Report from an install run
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub record: InstallationRecord,
    pub summary: RunSummary,
    /// True when this run created the record
    pub fresh: bool,
}

impl InstallReport {
    pub fn exit_code(&self) -> i32 {
        if self.summary.succeeded() { 0 } else { 1 }
    }
}

pub struct InstallCommand {
    config: LabConfig,
    store: StatusStore,
    probe: Box<dyn SharedRuntimeProbe>,
}

impl InstallCommand {
    pub fn new(config: LabConfig, store: StatusStore) -> Self {
        let probe = CondaProbe::new(config.shared_runtime.clone());
        Self {
            config,
            store,
            probe: Box::new(probe),
        }
    }

    pub fn with_probe(mut self, probe: impl SharedRuntimeProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn root_for(&self, options: &InstallOptions) -> PathBuf {
        self.config.layout.root_for(&options.volume, options.mode)
    }

    /// The standard step sequence for this configuration.
    pub fn steps(&self) -> Vec<Box<dyn Step>> {
        default_steps(&self.config)
    }

    /// Stored record for the target root, if any.
    pub fn status(&self, options: &InstallOptions) -> anyhow::Result<Option<InstallationRecord>> {
        Ok(self.store.load(&self.root_for(options))?)
    }

    pub fn run(&self, options: &InstallOptions) -> anyhow::Result<InstallReport> {
        let steps = self.steps();
        self.run_steps(options, &steps)
    }

    /// Run an explicit step sequence.
    pub fn run_steps(
        &self,
        options: &InstallOptions,
        steps: &[Box<dyn Step>],
    ) -> anyhow::Result<InstallReport> {
        let root = self.root_for(options);
        let volume = options.volume.display().to_string();

        let (mut record, fresh) = match self.store.load(&root)? {
            Some(mut record) => {
                if !same_path(&record.root_path, &root) {
                    tracing::warn!(
                        stored = %record.root_path.display(),
                        found = %root.display(),
                        "Installation root moved since last save; resuming at new location"
                    );
                    record.root_path = root.clone();
                    record.volume = volume;
                }
                if record.mode != options.mode {
                    tracing::warn!(
                        stored = record.mode.as_str(),
                        requested = options.mode.as_str(),
                        "Keeping layout mode of existing installation"
                    );
                }
                (record, false)
            }
            None => {
                // Must run before anything creates the root.
                let snapshot = capture_or_empty(&root, &volume, self.probe.as_ref());
                let record = InstallationRecord::new(root.clone(), volume, options.mode, snapshot);
                tracing::info!(
                    id = %record.id,
                    root = %root.display(),
                    "Starting new installation"
                );
                (record, true)
            }
        };

        let orchestrator = StepOrchestrator::new(&self.store, &self.config);
        let summary = orchestrator.run(&mut record, steps, options.start_step)?;
        Ok(InstallReport {
            record,
            summary,
            fresh,
        })
    }
}
