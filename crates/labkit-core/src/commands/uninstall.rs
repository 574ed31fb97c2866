//! Uninstall command implementation.
//!
//! Discovers the installation, builds the plan, executes it and verifies
//! the result.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::LabConfig;
use crate::discovery::{DiscoveredInstallation, Discovery, SystemVolumes, VolumeEnumerator};
use crate::error::LabError;
use crate::status::StatusStore;
use crate::uninstall::{
    Action, CondaEnvRemover, Confirm, EnvironmentRemover, ExecuteOptions, ExecutionResult,
    Executor, FsRemover, PlanBuilder, PlanOptions, ProcessController, Remover, RetryPolicy,
    SystemProcesses, UninstallPlan, verify,
};

/// Options for the uninstall command
#[derive(Debug, Clone)]
pub struct UninstallOptions {
    /// No prompts; an ambiguous selection is an error
    pub auto: bool,
    pub dry_run: bool,
    /// Keep user content such as `Projects`
    pub keep_projects: bool,
    pub backup: bool,
    /// Explicit installation root
    pub path: Option<PathBuf>,
    /// Restrict removal to these components or entry names
    pub components: Vec<String>,
    /// Also remove the lab source repository the installation came with
    pub remove_lab_repo: bool,
}

impl Default for UninstallOptions {
    fn default() -> Self {
        Self {
            auto: false,
            dry_run: false,
            keep_projects: true,
            backup: false,
            path: None,
            components: Vec::new(),
            remove_lab_repo: true,
        }
    }
}

impl UninstallOptions {
    pub fn with_auto(mut self, auto: bool) -> Self {
        self.auto = auto;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_keep_projects(mut self, keep: bool) -> Self {
        self.keep_projects = keep;
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_components(mut self, components: Vec<String>) -> Self {
        self.components = components;
        self
    }

    pub fn with_remove_lab_repo(mut self, remove: bool) -> Self {
        self.remove_lab_repo = remove;
        self
    }

    fn plan_options(&self, installation: &DiscoveredInstallation) -> PlanOptions {
        let lab_repo = if self.remove_lab_repo {
            installation.lab_repo.clone()
        } else {
            None
        };
        PlanOptions::default()
            .with_keep_projects(self.keep_projects)
            .with_named(self.components.clone())
            .with_lab_repo(lab_repo)
    }
}

/// Interactive decisions the command may need.
pub trait Prompter: Confirm {
    /// Pick one of several installations. `None` cancels.
    fn select(&self, installations: &[DiscoveredInstallation]) -> anyhow::Result<Option<usize>>;
}

/// Prompter for unattended runs: confirms every plan, never selects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl Confirm for NoPrompt {
    fn confirm(&self, _plan: &UninstallPlan) -> anyhow::Result<bool> {
        Ok(true)
    }
}

impl Prompter for NoPrompt {
    fn select(&self, installations: &[DiscoveredInstallation]) -> anyhow::Result<Option<usize>> {
        Err(LabError::AmbiguousSelection {
            count: installations.len(),
        }
        .into())
    }
}

struct ConfirmVia<'a>(&'a dyn Prompter);

impl Confirm for ConfirmVia<'_> {
    fn confirm(&self, plan: &UninstallPlan) -> anyhow::Result<bool> {
        self.0.confirm(plan)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UninstallOutcome {
    Completed,
    CompletedWithWarnings,
    DryRun,
    Cancelled,
}

/// Report from an uninstall run
#[derive(Debug, Clone, Serialize)]
pub struct UninstallReport {
    pub installation_id: String,
    pub root: PathBuf,
    pub plan: UninstallPlan,
    pub results: Vec<ExecutionResult>,
    pub discrepancies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    pub outcome: UninstallOutcome,
    /// Warnings from quiescence and cleanup; plan warnings live on the plan
    pub warnings: Vec<String>,
}

impl UninstallReport {
    pub fn removed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.action, Action::Removed | Action::BackedUpThenRemoved))
            .count()
    }

    pub fn preserved(&self) -> usize {
        self.plan.to_preserve.len()
    }

    pub fn pre_existing(&self) -> usize {
        self.plan.pre_existing.len()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.action == Action::Failed)
            .count()
    }

    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            UninstallOutcome::Completed | UninstallOutcome::DryRun => 0,
            UninstallOutcome::CompletedWithWarnings | UninstallOutcome::Cancelled => 1,
        }
    }
}

/// Uninstall command orchestrator
pub struct UninstallCommand {
    config: LabConfig,
    store: StatusStore,
    volumes: Box<dyn VolumeEnumerator>,
    processes: Box<dyn ProcessController>,
    remover: Box<dyn Remover>,
    env_remover: Box<dyn EnvironmentRemover>,
    retry: RetryPolicy,
}

impl UninstallCommand {
    pub fn new(config: LabConfig, store: StatusStore) -> Self {
        let retry = RetryPolicy::from_config(&config.uninstall);
        let env_remover = CondaEnvRemover::new(&config.shared_runtime);
        Self {
            config,
            store,
            volumes: Box::new(SystemVolumes),
            processes: Box::new(SystemProcesses),
            remover: Box::new(FsRemover),
            env_remover: Box::new(env_remover),
            retry,
        }
    }

    pub fn with_volumes(mut self, volumes: impl VolumeEnumerator + 'static) -> Self {
        self.volumes = Box::new(volumes);
        self
    }

    pub fn with_processes(mut self, processes: impl ProcessController + 'static) -> Self {
        self.processes = Box::new(processes);
        self
    }

    pub fn with_remover(mut self, remover: impl Remover + 'static) -> Self {
        self.remover = Box::new(remover);
        self
    }

    pub fn with_env_remover(mut self, remover: impl EnvironmentRemover + 'static) -> Self {
        self.env_remover = Box::new(remover);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn discovery(&self) -> Discovery {
        Discovery::new(&self.config, self.store.clone())
    }

    /// Every installation reachable from the configured volumes.
    pub fn list(&self) -> anyhow::Result<Vec<DiscoveredInstallation>> {
        self.discovery().find_all(&self.volumes.volumes())
    }

    /// Resolve the installation to act on.
    pub fn select(
        &self,
        options: &UninstallOptions,
        prompter: &dyn Prompter,
    ) -> anyhow::Result<DiscoveredInstallation> {
        if let Some(path) = &options.path {
            return self
                .discovery()
                .find_by_path(path)
                .ok_or_else(|| LabError::DiscoveryMiss.into());
        }

        let mut found = self.list()?;
        match found.len() {
            0 => Err(LabError::DiscoveryMiss.into()),
            1 => Ok(found.remove(0)),
            count if options.auto => Err(LabError::AmbiguousSelection { count }.into()),
            _ => match prompter.select(&found)? {
                Some(index) if index < found.len() => Ok(found.swap_remove(index)),
                Some(index) => anyhow::bail!("Selection {} is out of range", index),
                None => Err(LabError::Cancelled.into()),
            },
        }
    }

    pub fn plan(
        &self,
        installation: &DiscoveredInstallation,
        options: &UninstallOptions,
    ) -> anyhow::Result<UninstallPlan> {
        PlanBuilder::new(&self.config)
            .build(&installation.record, &options.plan_options(installation))
    }

    /// Discover, plan, execute and verify.
    pub fn run(
        &self,
        options: &UninstallOptions,
        prompter: &dyn Prompter,
    ) -> anyhow::Result<UninstallReport> {
        let installation = self.select(options, prompter)?;
        let root = installation.root().to_path_buf();
        tracing::info!(
            root = %root.display(),
            id = %installation.record.id,
            primary = installation.primary,
            "Selected installation"
        );

        let plan = self.plan(&installation, options)?;
        let executor =
            Executor::new(&self.config.uninstall, self.processes.as_ref(), self.remover.as_ref())
                .with_env_remover(self.env_remover.as_ref())
                .with_retry_policy(self.retry);
        let execute_options = ExecuteOptions {
            backup: options.backup,
            auto_confirm: options.auto,
            dry_run: options.dry_run,
        };
        let execution = executor.execute(&plan, &execute_options, &ConfirmVia(prompter))?;

        let mut report = UninstallReport {
            installation_id: installation.record.id.clone(),
            root: root.clone(),
            plan,
            results: execution.results,
            discrepancies: Vec::new(),
            backup_dir: execution.backup_dir,
            outcome: UninstallOutcome::Completed,
            warnings: execution.warnings,
        };

        if options.dry_run {
            report.outcome = UninstallOutcome::DryRun;
            return Ok(report);
        }
        if execution.cancelled {
            report.outcome = UninstallOutcome::Cancelled;
            return Ok(report);
        }

        report.discrepancies = verify(&report.plan, &report.results);
        if !report.discrepancies.is_empty() {
            let mismatch = LabError::VerificationMismatch {
                count: report.discrepancies.len(),
            };
            report.warnings.push(mismatch.to_string());
        }

        if !StatusStore::status_path(&root).exists() {
            match self.store.clear_mirror_if(&root) {
                Ok(true) => tracing::debug!("Cleared status mirror"),
                Ok(false) => {}
                Err(err) => report.warnings.push(format!("{:#}", err)),
            }
        }

        if report.failed() > 0 || !report.discrepancies.is_empty() {
            report.outcome = UninstallOutcome::CompletedWithWarnings;
        }
        tracing::info!(
            removed = report.removed(),
            preserved = report.preserved(),
            pre_existing = report.pre_existing(),
            failed = report.failed(),
            "Uninstall finished"
        );
        Ok(report)
    }
}
