//! Integration tests for the install command

mod support;

use std::path::PathBuf;

use tempfile::TempDir;

use labkit_core::commands::{
    InstallCommand, InstallOptions, NoPrompt, UninstallCommand, UninstallOptions,
};
use labkit_core::config::LabConfig;
use labkit_core::discovery::{StaticVolumes, Volume};
use labkit_core::install::{ACTIVATION_SCRIPT, INSTALLATION_INFO};
use labkit_core::status::{InstallMode, STATUS_FILE_NAME, StatusStore, StepStatus};

use support::{IdleProcesses, NoRuntime, names};

fn setup(config: LabConfig) -> (TempDir, PathBuf, InstallCommand) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let volume = temp.path().join("E");
    std::fs::create_dir_all(&volume).expect("Failed to create volume");
    let store = StatusStore::new(temp.path().join("state"));
    let cmd = InstallCommand::new(config, store).with_probe(NoRuntime);
    (temp, volume, cmd)
}

fn quick_config() -> LabConfig {
    let mut config = LabConfig::default();
    config.uninstall.quiesce_wait_ms = 0;
    config.uninstall.delete_delay_ms = 0;
    config
}

#[test]
fn fresh_install_runs_every_step() {
    let (_temp, volume, cmd) = setup(quick_config());
    let options = InstallOptions::new(&volume);

    let report = cmd.run(&options).expect("Install should succeed");

    assert!(report.fresh);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.summary.executed.len(), cmd.steps().len());
    assert!(
        report
            .record
            .completed_steps
            .iter()
            .all(|s| s.status == StepStatus::Succeeded)
    );

    let root = volume.join("AI_Lab").join("AI_Environment");
    assert_eq!(report.record.root_path, root);
    assert_eq!(report.record.mode, InstallMode::Nested);
    assert!(!report.record.snapshot.existed_before);
    for entry in ["Miniconda", "VSCode", "Ollama", "Projects", "Models"] {
        assert!(root.join(entry).is_dir(), "{} missing", entry);
    }
    assert!(root.join(ACTIVATION_SCRIPT).is_file());
    assert!(root.join(INSTALLATION_INFO).is_file());
    assert!(root.join(STATUS_FILE_NAME).is_file());

    let stored = cmd.status(&options).expect("status").expect("record");
    assert_eq!(stored.id, report.record.id);
}

#[test]
fn rerun_after_success_does_nothing() {
    let (_temp, volume, cmd) = setup(quick_config());
    let options = InstallOptions::new(&volume).with_mode(InstallMode::SideBySide);

    let first = cmd.run(&options).expect("first install");
    let second = cmd.run(&options).expect("second install");

    assert!(!second.fresh);
    assert_eq!(second.record.id, first.record.id);
    assert!(second.summary.executed.is_empty());
    assert_eq!(second.summary.skipped.len(), cmd.steps().len());
    assert!(volume.join("AI_Environment").join(ACTIVATION_SCRIPT).is_file());
}

#[test]
fn install_then_uninstall_keeps_pre_existing_content() {
    let (temp, volume, cmd) = setup(quick_config());
    let root = volume.join("AI_Lab").join("AI_Environment");
    std::fs::create_dir_all(root.join("MyNotes")).expect("Failed to create notes");
    std::fs::write(root.join("MyNotes").join("ideas.txt"), "keep me")
        .expect("Failed to write notes");

    let report = cmd.run(&InstallOptions::new(&volume)).expect("install");
    assert!(report.record.snapshot.existed_before);
    assert!(report.record.snapshot.predates("MyNotes"));

    let uninstall = UninstallCommand::new(
        quick_config(),
        StatusStore::new(temp.path().join("state")),
    )
    .with_volumes(StaticVolumes::new(vec![Volume::new("E:", &volume)]))
    .with_processes(IdleProcesses);
    let report = uninstall
        .run(
            &UninstallOptions::default()
                .with_auto(true)
                .with_keep_projects(false),
            &NoPrompt,
        )
        .expect("uninstall");

    assert_eq!(report.exit_code(), 0);
    assert_eq!(names(&report.plan.pre_existing), vec!["MyNotes"]);
    assert!(report.discrepancies.is_empty());
    assert_eq!(
        std::fs::read_to_string(root.join("MyNotes").join("ideas.txt")).expect("notes"),
        "keep me"
    );
    let remaining: Vec<String> = std::fs::read_dir(&root)
        .expect("read root")
        .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(remaining, vec!["MyNotes"]);
}

#[test]
fn resume_on_remounted_volume_follows_new_location() {
    let (temp, old_volume, cmd) = setup(quick_config());
    let first = cmd.run(&InstallOptions::new(&old_volume)).expect("install");

    let new_volume = temp.path().join("F");
    std::fs::rename(&old_volume, &new_volume).expect("Failed to move volume");

    let report = cmd
        .run(&InstallOptions::new(&new_volume).with_start_step(1))
        .expect("resume");

    let root = new_volume.join("AI_Lab").join("AI_Environment");
    assert!(!report.fresh);
    assert_eq!(report.record.id, first.record.id);
    assert_eq!(report.record.root_path, root);
    assert_eq!(report.record.volume, new_volume.display().to_string());
    assert!(!old_volume.exists());

    let stored = StatusStore::without_mirror()
        .load(&root)
        .expect("load")
        .expect("record");
    assert_eq!(stored.root_path, root);
}

#[test]
fn start_step_out_of_range_is_an_error() {
    let (_temp, volume, cmd) = setup(quick_config());
    let options = InstallOptions::new(&volume).with_start_step(42);
    assert!(cmd.run(&options).is_err());
}

#[cfg(unix)]
fn scripted_component(script: &str) -> LabConfig {
    let mut config = quick_config();
    config.components = vec![labkit_core::config::ComponentConfig {
        name: "tools".to_string(),
        dir: "Tools".to_string(),
        command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
    }];
    config
}

#[cfg(unix)]
#[test]
fn component_command_sees_target_environment() {
    let (_temp, volume, cmd) = setup(scripted_component(
        "printf '%s' \"$LABKIT_TARGET\" > \"$LABKIT_COMPONENT_DIR/target.txt\"",
    ));

    let report = cmd.run(&InstallOptions::new(&volume)).expect("install");
    assert_eq!(report.exit_code(), 0);

    let root = volume.join("AI_Lab").join("AI_Environment");
    let target = std::fs::read_to_string(root.join("Tools").join("target.txt"))
        .expect("component output");
    assert_eq!(PathBuf::from(target), root);
}

#[cfg(unix)]
#[test]
fn failing_component_halts_and_resumes() {
    let (temp, volume, cmd) = setup(scripted_component("echo boom >&2; exit 3"));

    let report = cmd.run(&InstallOptions::new(&volume)).expect("install");
    assert_eq!(report.exit_code(), 1);
    let failure = report.summary.failed.expect("failure");
    assert_eq!(failure.step_id, "component:tools");
    assert!(failure.error.contains("boom"));
    let root = volume.join("AI_Lab").join("AI_Environment");
    assert!(!root.join(ACTIVATION_SCRIPT).exists());

    let fixed = InstallCommand::new(
        scripted_component("true"),
        StatusStore::new(temp.path().join("state")),
    )
    .with_probe(NoRuntime);
    let report = fixed.run(&InstallOptions::new(&volume)).expect("resume");
    assert!(!report.fresh);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.summary.skipped, vec!["prepare_layout"]);
    assert!(root.join(ACTIVATION_SCRIPT).is_file());
}
