#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;

use labkit_core::snapshot::{SharedRuntimeProbe, SharedRuntimeState, Snapshot};
use labkit_core::status::{InstallMode, InstallationRecord};
use labkit_core::uninstall::{FsRemover, ProcessController, Remover, ResourceItem};

/// Probe that never finds a runtime.
pub struct NoRuntime;

impl SharedRuntimeProbe for NoRuntime {
    fn portable(&self, _root: &Path) -> Option<PathBuf> {
        None
    }

    fn shared(&self) -> Option<PathBuf> {
        None
    }

    fn interpreter_on_path(&self) -> bool {
        false
    }
}

/// Process controller with nothing running.
pub struct IdleProcesses;

impl ProcessController for IdleProcesses {
    fn is_running(&self, _name: &str) -> bool {
        false
    }

    fn terminate(&self, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn kill(&self, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Remover that refuses to delete entries with the given name.
pub struct LockedRemover {
    pub locked: String,
    pub attempts: RefCell<u32>,
}

impl LockedRemover {
    pub fn new(locked: &str) -> Self {
        Self {
            locked: locked.to_string(),
            attempts: RefCell::new(0),
        }
    }
}

impl Remover for LockedRemover {
    fn remove(&self, path: &Path) -> anyhow::Result<()> {
        if path.file_name().is_some_and(|n| n.to_string_lossy() == self.locked) {
            *self.attempts.borrow_mut() += 1;
            anyhow::bail!("The process cannot access the file because it is in use");
        }
        FsRemover.remove(path)
    }
}

/// The twelve top-level entries of a complete installation.
pub const INSTALL_DIRS: [&str; 9] = [
    "Miniconda",
    "VSCode",
    "Ollama",
    "Projects",
    "Logs",
    "Models",
    "Tools",
    "Scripts",
    "downloads",
];
pub const INSTALL_FILES: [&str; 3] = [
    "activate_ai_env.bat",
    "installation_info.json",
    "README.md",
];

/// Create a full installation tree under `root`.
pub fn populate_installation(root: &Path) {
    for dir in INSTALL_DIRS {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).expect("Failed to create dir");
        std::fs::write(path.join("placeholder.txt"), dir).expect("Failed to write file");
    }
    for file in INSTALL_FILES {
        std::fs::write(root.join(file), file).expect("Failed to write file");
    }
}

/// Create a lab source repository clone at `lab`.
pub fn populate_lab_repo(lab: &Path) {
    std::fs::create_dir_all(lab.join(".git").join("objects")).expect("Failed to create dir");
    std::fs::write(lab.join(".git").join("HEAD"), "ref: refs/heads/main\n")
        .expect("Failed to write file");
    std::fs::create_dir_all(lab.join("src")).expect("Failed to create dir");
    std::fs::write(lab.join("src").join("installer.py"), "print('install')\n")
        .expect("Failed to write file");
    std::fs::write(lab.join("run_ai_env.bat"), "@echo off\r\n").expect("Failed to write file");
}

pub fn captured_snapshot(volume: &str, existing: &[&str]) -> Snapshot {
    Snapshot {
        timestamp: Some(Utc::now()),
        target_volume: volume.to_string(),
        existed_before: !existing.is_empty(),
        existing_subdirectories: existing.iter().map(|s| s.to_string()).collect(),
        shared_runtime: SharedRuntimeState::default(),
        system_interpreter_on_path: false,
        capture_error: None,
    }
}

pub fn record_for(root: &Path, snapshot: Snapshot) -> InstallationRecord {
    InstallationRecord::new(root.to_path_buf(), "E:", InstallMode::Nested, snapshot)
}

pub fn names(items: &BTreeSet<ResourceItem>) -> Vec<String> {
    items.iter().map(|item| item.name.clone()).collect()
}

/// Every path under `root`, for before/after comparisons.
pub fn tree(root: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            paths.push(path);
        }
    }
    paths.sort();
    paths
}
