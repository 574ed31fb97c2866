//! Plan execution: quiesce, back up, delete.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;

use super::plan::{ResourceItem, ResourceKind, UninstallPlan};
use super::process::{ProcessController, quiesce};
use super::runtime_env::EnvironmentRemover;
use crate::config::UninstallConfig;
use crate::error::LabError;
use crate::fs::{copy_path, hash_path, path_present, remove_path_if_exists};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Removed,
    BackedUpThenRemoved,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub item: ResourceItem,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    fn new(item: &ResourceItem, action: Action) -> Self {
        Self {
            item: item.clone(),
            action,
            error: None,
        }
    }

    fn failed(item: &ResourceItem, err: LabError) -> Self {
        Self {
            item: item.clone(),
            action: Action::Failed,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub backup: bool,
    pub auto_confirm: bool,
    pub dry_run: bool,
}

/// Deletes one filesystem entry.
pub trait Remover {
    fn remove(&self, path: &Path) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsRemover;

impl Remover for FsRemover {
    fn remove(&self, path: &Path) -> anyhow::Result<()> {
        remove_path_if_exists(path).map(|_| ())
    }
}

/// Fixed-delay retry for deletes that hit locked files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &UninstallConfig) -> Self {
        Self {
            attempts: config.delete_attempts.max(1),
            delay: config.delete_delay(),
        }
    }
}

/// Asks the user to approve a plan before anything is touched.
pub trait Confirm {
    fn confirm(&self, plan: &UninstallPlan) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub results: Vec<ExecutionResult>,
    pub backup_dir: Option<PathBuf>,
    pub cancelled: bool,
    pub root_removed: bool,
    pub lab_repo_removed: bool,
    pub warnings: Vec<String>,
}

impl Execution {
    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.action == Action::Failed)
            .count()
    }
}

pub struct Executor<'a> {
    processes: &'a dyn ProcessController,
    remover: &'a dyn Remover,
    env_remover: Option<&'a dyn EnvironmentRemover>,
    process_names: Vec<String>,
    quiesce_wait: Duration,
    retry: RetryPolicy,
}

impl<'a> Executor<'a> {
    pub fn new(
        config: &UninstallConfig,
        processes: &'a dyn ProcessController,
        remover: &'a dyn Remover,
    ) -> Self {
        Self {
            processes,
            remover,
            env_remover: None,
            process_names: config.processes.clone(),
            quiesce_wait: config.quiesce_wait(),
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Remove shared-runtime environments through `remover` before
    /// falling back to deleting their directory.
    pub fn with_env_remover(mut self, remover: &'a dyn EnvironmentRemover) -> Self {
        self.env_remover = Some(remover);
        self
    }

    pub fn with_quiesce_wait(mut self, wait: Duration) -> Self {
        self.quiesce_wait = wait;
        self
    }

    /// Apply `plan`. Only `to_remove` items are touched; each gets exactly
    /// one result.
    pub fn execute(
        &self,
        plan: &UninstallPlan,
        options: &ExecuteOptions,
        confirm: &dyn Confirm,
    ) -> anyhow::Result<Execution> {
        let mut execution = Execution::default();

        if options.dry_run {
            execution.results = plan
                .removal_order()
                .into_iter()
                .map(|item| ExecutionResult::new(item, Action::Skipped))
                .collect();
            return Ok(execution);
        }

        if !options.auto_confirm && !confirm.confirm(plan)? {
            tracing::info!("Uninstall cancelled");
            execution.cancelled = true;
            return Ok(execution);
        }

        execution.warnings = quiesce(self.processes, &self.process_names, self.quiesce_wait);

        let backup_dir = options.backup.then(|| backup_dir_for(&plan.root));
        for item in plan.removal_order() {
            let result = self.apply(item, &plan.root, backup_dir.as_deref());
            execution.results.push(result);
        }
        if let Some(dir) = backup_dir.filter(|d| d.exists()) {
            tracing::info!(path = %dir.display(), "Backup written");
            execution.backup_dir = Some(dir);
        }

        execution.root_removed = remove_if_empty(&plan.root);
        if let Some(lab) = &plan.lab_repo {
            execution.lab_repo_removed = remove_if_empty(lab);
        }
        Ok(execution)
    }

    fn apply(
        &self,
        item: &ResourceItem,
        root: &Path,
        backup_dir: Option<&Path>,
    ) -> ExecutionResult {
        if !path_present(&item.path) {
            tracing::debug!(path = %item.path.display(), "Already absent");
            return ExecutionResult::new(item, Action::Skipped);
        }

        if let Some(dir) = backup_dir {
            if let Err(err) = backup_item(item, root, dir) {
                tracing::warn!(path = %item.path.display(), error = %err, "Backup failed");
                return ExecutionResult::failed(item, err);
            }
        }

        if item.kind == ResourceKind::Environment {
            if let Some(env_remover) = self.env_remover {
                match env_remover.remove_env(&item.path) {
                    Ok(()) if !path_present(&item.path) => {
                        tracing::info!(path = %item.path.display(), "Removed environment");
                        return ExecutionResult::new(item, removed_action(backup_dir));
                    }
                    Ok(()) => {
                        tracing::debug!(
                            path = %item.path.display(),
                            "Environment directory left behind"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(
                            path = %item.path.display(),
                            error = %format!("{:#}", err),
                            "Runtime could not remove environment; deleting directory"
                        );
                    }
                }
            }
        }

        match self.delete_with_retry(&item.path) {
            Ok(()) => {
                tracing::info!(path = %item.path.display(), "Removed");
                ExecutionResult::new(item, removed_action(backup_dir))
            }
            Err(err) => {
                tracing::warn!(path = %item.path.display(), error = %err, "Delete failed");
                ExecutionResult::failed(item, err)
            }
        }
    }

    fn delete_with_retry(&self, path: &Path) -> Result<(), LabError> {
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match self.remover.remove(path) {
                Ok(()) if !path_present(path) => return Ok(()),
                Ok(()) => {
                    tracing::debug!(path = %path.display(), attempt, "Entry still present");
                }
                Err(err) => {
                    tracing::debug!(
                        path = %path.display(),
                        attempt,
                        error = %format!("{:#}", err),
                        "Delete attempt failed"
                    );
                }
            }
            if attempt < attempts && !self.retry.delay.is_zero() {
                thread::sleep(self.retry.delay);
            }
        }
        Err(LabError::ResourceLocked {
            path: path.to_path_buf(),
            attempts,
        })
    }
}

fn removed_action(backup_dir: Option<&Path>) -> Action {
    if backup_dir.is_some() {
        Action::BackedUpThenRemoved
    } else {
        Action::Removed
    }
}

/// `<root parent>/<root name>_Backup_<timestamp>`
pub fn backup_dir_for(root: &Path) -> PathBuf {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "installation".to_string());
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let parent = root.parent().unwrap_or(root);
    parent.join(format!("{}_Backup_{}", name, stamp))
}

/// Copy `item` into `backup_dir` and confirm the copy hashes the same.
fn backup_item(item: &ResourceItem, root: &Path, backup_dir: &Path) -> Result<(), LabError> {
    let relative = item
        .path
        .strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(&item.name));
    let target = backup_dir.join(relative);

    let failed = |reason: String| LabError::BackupFailed {
        path: item.path.clone(),
        reason,
    };

    copy_path(&item.path, &target).map_err(|e| failed(format!("{:#}", e)))?;
    let source_hash = hash_path(&item.path).map_err(|e| failed(format!("{:#}", e)))?;
    let copy_hash = hash_path(&target).map_err(|e| failed(format!("{:#}", e)))?;
    if source_hash != copy_hash {
        return Err(failed("backup copy does not match source".to_string()));
    }
    Ok(())
}

fn remove_if_empty(dir: &Path) -> bool {
    let empty = fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    if !empty {
        return false;
    }
    match fs::remove_dir(dir) {
        Ok(()) => {
            tracing::info!(path = %dir.display(), "Removed empty directory");
            true
        }
        Err(err) => {
            tracing::warn!(path = %dir.display(), error = %err, "Failed to remove empty directory");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_dir_sits_next_to_root() {
        let dir = backup_dir_for(Path::new("/vol/AI_Lab/AI_Environment"));
        assert_eq!(dir.parent(), Some(Path::new("/vol/AI_Lab")));
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("AI_Environment_Backup_"));
    }

    #[test]
    fn retry_policy_never_drops_below_one_attempt() {
        let config = UninstallConfig {
            delete_attempts: 0,
            ..UninstallConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).attempts, 1);
    }
}
