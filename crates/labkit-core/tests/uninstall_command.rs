mod support;

use std::cell::Cell;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use labkit_core::commands::{
    NoPrompt, Prompter, UninstallCommand, UninstallOptions, UninstallOutcome,
};
use labkit_core::config::LabConfig;
use labkit_core::discovery::{DiscoveredInstallation, StaticVolumes, Volume};
use labkit_core::error::LabError;
use labkit_core::status::{STATUS_FILE_NAME, StatusStore};
use labkit_core::uninstall::{Action, Confirm, RetryPolicy, UninstallPlan};

use support::{
    IdleProcesses, LockedRemover, captured_snapshot, populate_installation, populate_lab_repo,
    record_for,
};

fn quick_config() -> LabConfig {
    let mut config = LabConfig::default();
    config.uninstall.quiesce_wait_ms = 0;
    config.uninstall.delete_delay_ms = 0;
    config
}

fn volume(temp: &TempDir, id: &str) -> Volume {
    let mount = temp.path().join(id.trim_end_matches(':'));
    std::fs::create_dir_all(&mount).expect("Failed to create mount");
    Volume::new(id, mount)
}

fn nested_root(volume: &Volume) -> PathBuf {
    volume.mount.join("AI_Lab").join("AI_Environment")
}

fn command(temp: &TempDir, volumes: Vec<Volume>) -> UninstallCommand {
    UninstallCommand::new(quick_config(), StatusStore::new(temp.path().join("state")))
        .with_volumes(StaticVolumes::new(volumes))
        .with_processes(IdleProcesses)
}

/// Prompter that picks a fixed index and answers confirmation.
struct Scripted {
    pick: Option<usize>,
    approve: bool,
    asked: Cell<u32>,
}

impl Confirm for Scripted {
    fn confirm(&self, _plan: &UninstallPlan) -> anyhow::Result<bool> {
        self.asked.set(self.asked.get() + 1);
        Ok(self.approve)
    }
}

impl Prompter for Scripted {
    fn select(&self, _installations: &[DiscoveredInstallation]) -> anyhow::Result<Option<usize>> {
        Ok(self.pick)
    }
}

#[test]
fn automatic_uninstall_removes_installation() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let root = nested_root(&e);
    populate_installation(&root);

    let report = command(&temp, vec![e])
        .run(&UninstallOptions::default().with_auto(true), &NoPrompt)
        .expect("run");

    assert_eq!(report.outcome, UninstallOutcome::Completed);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.removed(), 11);
    assert_eq!(report.preserved(), 1);
    assert!(report.discrepancies.is_empty());
    assert!(root.join("Projects").is_dir());
    assert!(!root.join("Miniconda").exists());
}

#[test]
fn locked_item_completes_with_warnings() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let root = nested_root(&e);
    populate_installation(&root);

    let report = command(&temp, vec![e])
        .with_remover(LockedRemover::new("Ollama"))
        .with_retry_policy(RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
        })
        .run(&UninstallOptions::default().with_auto(true), &NoPrompt)
        .expect("run");

    assert_eq!(report.outcome, UninstallOutcome::CompletedWithWarnings);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.discrepancies.len(), 1);
    assert!(
        report.discrepancies[0].contains(&root.join("Ollama").display().to_string())
    );
    assert!(root.join("Ollama").exists());
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.contains("Verification found 1 discrepancies"))
    );
}

#[test]
fn nothing_found_is_a_discovery_miss() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");

    let err = command(&temp, vec![e])
        .run(&UninstallOptions::default().with_auto(true), &NoPrompt)
        .expect_err("nothing to uninstall");
    assert!(matches!(
        err.downcast_ref::<LabError>(),
        Some(LabError::DiscoveryMiss)
    ));
}

#[test]
fn several_installations_in_auto_mode_are_ambiguous() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let f = volume(&temp, "F:");
    populate_installation(&nested_root(&e));
    populate_installation(&nested_root(&f));

    let err = command(&temp, vec![e.clone(), f.clone()])
        .run(&UninstallOptions::default().with_auto(true), &NoPrompt)
        .expect_err("ambiguous");
    assert!(matches!(
        err.downcast_ref::<LabError>(),
        Some(LabError::AmbiguousSelection { count: 2 })
    ));
    assert!(nested_root(&e).join("Ollama").exists());
    assert!(nested_root(&f).join("Ollama").exists());
}

#[test]
fn explicit_path_resolves_ambiguity() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let f = volume(&temp, "F:");
    populate_installation(&nested_root(&e));
    populate_installation(&nested_root(&f));

    let report = command(&temp, vec![e.clone(), f.clone()])
        .run(
            &UninstallOptions::default()
                .with_auto(true)
                .with_path(nested_root(&f)),
            &NoPrompt,
        )
        .expect("run");

    assert_eq!(report.root, nested_root(&f));
    assert!(!nested_root(&f).join("Ollama").exists());
    assert!(nested_root(&e).join("Ollama").exists());
}

#[test]
fn prompter_chooses_among_installations() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let f = volume(&temp, "F:");
    populate_installation(&nested_root(&e));
    populate_installation(&nested_root(&f));

    let prompter = Scripted {
        pick: Some(1),
        approve: true,
        asked: Cell::new(0),
    };
    let report = command(&temp, vec![e.clone(), f.clone()])
        .run(&UninstallOptions::default(), &prompter)
        .expect("run");

    assert_eq!(prompter.asked.get(), 1);
    assert_eq!(report.root, nested_root(&f));
    assert!(nested_root(&e).join("Ollama").exists());
}

#[test]
fn dismissed_selection_is_cancelled() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let f = volume(&temp, "F:");
    populate_installation(&nested_root(&e));
    populate_installation(&nested_root(&f));

    let prompter = Scripted {
        pick: None,
        approve: true,
        asked: Cell::new(0),
    };
    let err = command(&temp, vec![e, f])
        .run(&UninstallOptions::default(), &prompter)
        .expect_err("cancelled");
    assert!(matches!(
        err.downcast_ref::<LabError>(),
        Some(LabError::Cancelled)
    ));
}

#[test]
fn declined_plan_leaves_everything() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let root = nested_root(&e);
    populate_installation(&root);

    let prompter = Scripted {
        pick: None,
        approve: false,
        asked: Cell::new(0),
    };
    let report = command(&temp, vec![e])
        .run(&UninstallOptions::default(), &prompter)
        .expect("run");

    assert_eq!(report.outcome, UninstallOutcome::Cancelled);
    assert_eq!(report.exit_code(), 1);
    assert!(report.results.is_empty());
    assert!(root.join("Ollama").exists());
}

#[test]
fn dry_run_reports_plan_only() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let root = nested_root(&e);
    populate_installation(&root);

    let report = command(&temp, vec![e])
        .run(
            &UninstallOptions::default()
                .with_auto(true)
                .with_dry_run(true)
                .with_keep_projects(false),
            &NoPrompt,
        )
        .expect("run");

    assert_eq!(report.outcome, UninstallOutcome::DryRun);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.plan.to_remove.len(), 12);
    assert!(report.results.iter().all(|r| r.action == Action::Skipped));
    assert!(root.join("Projects").exists());
    assert!(root.join("installation_info.json").exists());
}

#[test]
fn full_removal_clears_status_mirror() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let root = nested_root(&e);
    populate_installation(&root);

    let store = StatusStore::new(temp.path().join("state"));
    let record = record_for(&root, captured_snapshot("E:", &[]));
    store.save(&record).expect("save");
    assert!(store.load_mirror().is_some());

    let report = command(&temp, vec![e])
        .run(
            &UninstallOptions::default()
                .with_auto(true)
                .with_keep_projects(false),
            &NoPrompt,
        )
        .expect("run");

    assert_eq!(report.outcome, UninstallOutcome::Completed);
    assert_eq!(report.installation_id, record.id);
    assert!(!root.join(STATUS_FILE_NAME).exists());
    assert!(!root.exists());
    assert!(store.load_mirror().is_none());
}

#[test]
fn json_report_carries_outcome_and_sets() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    populate_installation(&nested_root(&e));

    let report = command(&temp, vec![e])
        .run(
            &UninstallOptions::default().with_auto(true).with_dry_run(true),
            &NoPrompt,
        )
        .expect("run");

    let value = serde_json::to_value(&report).expect("serialize");
    assert_eq!(value["outcome"], "dry_run");
    assert_eq!(
        value["plan"]["to_preserve"][0]["ownership"],
        "user_content"
    );
    assert!(value.get("backup_dir").is_none());
}

#[test]
fn nested_uninstall_removes_lab_repository() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let root = nested_root(&e);
    let lab = e.mount.join("AI_Lab");
    populate_installation(&root);
    populate_lab_repo(&lab);

    let report = command(&temp, vec![e.clone()])
        .run(
            &UninstallOptions::default()
                .with_auto(true)
                .with_keep_projects(false),
            &NoPrompt,
        )
        .expect("run");

    assert_eq!(report.outcome, UninstallOutcome::Completed);
    assert_eq!(report.plan.lab_repo, Some(lab.clone()));
    assert!(report.discrepancies.is_empty());
    assert!(!lab.exists());
    assert!(e.mount.exists());

    let first_outside = report
        .results
        .iter()
        .position(|r| !r.item.path.starts_with(&root))
        .expect("lab entries");
    assert!(
        report.results[first_outside..]
            .iter()
            .all(|r| !r.item.path.starts_with(&root))
    );
}

#[test]
fn lab_repository_keeps_root_with_preserved_projects() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let root = nested_root(&e);
    let lab = e.mount.join("AI_Lab");
    populate_installation(&root);
    populate_lab_repo(&lab);

    let report = command(&temp, vec![e])
        .run(&UninstallOptions::default().with_auto(true), &NoPrompt)
        .expect("run");

    assert_eq!(report.exit_code(), 0);
    assert!(root.join("Projects").join("placeholder.txt").exists());
    let remaining: Vec<String> = std::fs::read_dir(&lab)
        .expect("read lab")
        .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(remaining, vec!["AI_Environment"]);
}

#[test]
fn keep_lab_option_leaves_repository() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let e = volume(&temp, "E:");
    let root = nested_root(&e);
    let lab = e.mount.join("AI_Lab");
    populate_installation(&root);
    populate_lab_repo(&lab);

    let report = command(&temp, vec![e])
        .run(
            &UninstallOptions::default()
                .with_auto(true)
                .with_keep_projects(false)
                .with_remove_lab_repo(false),
            &NoPrompt,
        )
        .expect("run");

    assert!(report.plan.lab_repo.is_none());
    assert!(!root.exists());
    assert!(lab.join(".git").join("HEAD").exists());
    assert!(lab.join("src").join("installer.py").exists());
}
