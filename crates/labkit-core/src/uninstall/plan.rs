//! Uninstall plan computation.
//!
//! Every top-level entry under the installation root, plus the shared
//! runtime the snapshot says predates the installation, lands in exactly
//! one of three sets:
//!
//! | Condition                                   | Set            |
//! |---------------------------------------------|----------------|
//! | Name recorded in the snapshot               | `pre_existing` |
//! | User content and `keep_projects`            | `to_preserve`  |
//! | Shared runtime root                         | `pre_existing` |
//! | Outside a named subset                      | `to_preserve`  |
//! | Anything else                               | `to_remove`    |
//!
//! When the installation has a lab source repository, its top-level entries
//! other than the installation root are removed too, after everything under
//! the root.
//!
//! Building a plan never touches the filesystem beyond reading it.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use crate::config::LabConfig;
use crate::status::InstallationRecord;
use crate::status::store::same_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    File,
    Directory,
    /// An environment inside the shared runtime; removed through the
    /// runtime's own tooling when possible.
    Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    InstallerCreated,
    PreExisting,
    UserContent,
}

/// One on-disk entry considered for removal. Ordered by path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ResourceItem {
    pub path: PathBuf,
    pub name: String,
    pub kind: ResourceKind,
    pub ownership: Ownership,
}

impl ResourceItem {
    fn at(path: PathBuf, ownership: Ownership) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let kind = match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => ResourceKind::Directory,
            _ => ResourceKind::File,
        };
        Self {
            path,
            name,
            kind,
            ownership,
        }
    }

    fn owned_as(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }

    fn of_kind(mut self, kind: ResourceKind) -> Self {
        self.kind = kind;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PlanScope {
    #[default]
    Full,
    /// Only these entries; component names resolve to their directories.
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    pub keep_projects: bool,
    pub scope: PlanScope,
    /// Lab source repository to remove along with the installation
    pub lab_repo: Option<PathBuf>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            keep_projects: true,
            scope: PlanScope::Full,
            lab_repo: None,
        }
    }
}

impl PlanOptions {
    pub fn with_keep_projects(mut self, keep: bool) -> Self {
        self.keep_projects = keep;
        self
    }

    pub fn with_named(mut self, names: Vec<String>) -> Self {
        self.scope = if names.is_empty() {
            PlanScope::Full
        } else {
            PlanScope::Named(names)
        };
        self
    }

    pub fn with_lab_repo(mut self, lab: Option<PathBuf>) -> Self {
        self.lab_repo = lab;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UninstallPlan {
    pub root: PathBuf,
    pub to_remove: BTreeSet<ResourceItem>,
    pub to_preserve: BTreeSet<ResourceItem>,
    pub pre_existing: BTreeSet<ResourceItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_repo: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl UninstallPlan {
    /// All planned items, in no particular set order.
    pub fn items(&self) -> impl Iterator<Item = &ResourceItem> {
        self.to_remove
            .iter()
            .chain(self.to_preserve.iter())
            .chain(self.pre_existing.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty()
    }

    /// `to_remove` in execution order: entries under the root first, then
    /// anything outside it.
    pub fn removal_order(&self) -> Vec<&ResourceItem> {
        let (inside, outside): (Vec<_>, Vec<_>) = self
            .to_remove
            .iter()
            .partition(|item| item.path.starts_with(&self.root));
        inside.into_iter().chain(outside).collect()
    }
}

pub struct PlanBuilder<'a> {
    config: &'a LabConfig,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(config: &'a LabConfig) -> Self {
        Self { config }
    }

    pub fn build(
        &self,
        record: &InstallationRecord,
        options: &PlanOptions,
    ) -> anyhow::Result<UninstallPlan> {
        let root = &record.root_path;
        let snapshot = &record.snapshot;
        let mut plan = UninstallPlan {
            root: root.clone(),
            ..UninstallPlan::default()
        };

        if !snapshot.is_captured() {
            plan.warnings.push(
                "No pre-install snapshot recorded; treating every entry as installer-created"
                    .to_string(),
            );
        }

        let subset = match &options.scope {
            PlanScope::Full => None,
            PlanScope::Named(names) => Some(self.resolve_names(names)),
        };

        let entries = list_entries(root)?;
        if entries.is_empty() && !root.exists() {
            plan.warnings
                .push(format!("Installation root no longer exists: {}", root.display()));
        }

        let mut out_of_scope = 0usize;
        for path in entries {
            let item = ResourceItem::at(path, Ownership::InstallerCreated);
            if snapshot.predates(&item.name) {
                plan.pre_existing.insert(item.owned_as(Ownership::PreExisting));
                continue;
            }

            let user_content = self.is_user_content(&item.name);
            let item = if user_content {
                item.owned_as(Ownership::UserContent)
            } else {
                item
            };
            if user_content && options.keep_projects {
                plan.warnings.push(format!("Preserving user content: {}", item.name));
                plan.to_preserve.insert(item);
            } else if subset.as_ref().is_some_and(|s| !s.contains(&item.name)) {
                out_of_scope += 1;
                plan.to_preserve.insert(item);
            } else {
                plan.to_remove.insert(item);
            }
        }

        if out_of_scope > 0 {
            plan.warnings.push(format!(
                "Keeping {} entries outside the selected components",
                out_of_scope
            ));
        }

        self.plan_shared_runtime(record, subset.as_ref(), &mut plan);
        if let Some(lab) = &options.lab_repo {
            self.plan_lab_repo(lab, subset.as_ref(), &mut plan)?;
        }

        if let Some(subset) = &subset {
            let env_name = &self.config.shared_runtime.env_name;
            let lab_dir = &self.config.layout.lab_dir;
            for name in subset {
                let found = plan.items().any(|item| &item.name == name);
                if !found && name != env_name && name != lab_dir {
                    plan.warnings
                        .push(format!("Selected component not found on disk: {}", name));
                }
            }
        }

        tracing::info!(
            root = %root.display(),
            remove = plan.to_remove.len(),
            preserve = plan.to_preserve.len(),
            pre_existing = plan.pre_existing.len(),
            "Built uninstall plan"
        );
        Ok(plan)
    }

    /// A shared runtime outside the root is never removed; only the
    /// environment the installer created inside it is.
    fn plan_shared_runtime(
        &self,
        record: &InstallationRecord,
        subset: Option<&BTreeSet<String>>,
        plan: &mut UninstallPlan,
    ) {
        let Some(shared) = &record.snapshot.shared_runtime.shared else {
            return;
        };
        if shared.starts_with(&record.root_path) || !shared.exists() {
            return;
        }

        plan.pre_existing
            .insert(ResourceItem::at(shared.clone(), Ownership::PreExisting));
        plan.warnings.push(format!(
            "Shared runtime at {} predates the installation and is kept",
            shared.display()
        ));

        let runtime = &self.config.shared_runtime;
        let env = shared.join("envs").join(&runtime.env_name);
        if !env.exists() {
            return;
        }
        let env_item =
            ResourceItem::at(env, Ownership::InstallerCreated).of_kind(ResourceKind::Environment);
        let in_scope = subset.is_none_or(|s| {
            s.contains(&runtime.env_name) || s.contains(&runtime.portable_dir)
        });
        if in_scope {
            plan.to_remove.insert(env_item);
        } else {
            plan.to_preserve.insert(env_item);
        }
    }

    /// The lab repository is a clone the installer was run from. Its entries
    /// go, except the installation root itself when nested inside it.
    fn plan_lab_repo(
        &self,
        lab: &Path,
        subset: Option<&BTreeSet<String>>,
        plan: &mut UninstallPlan,
    ) -> anyhow::Result<()> {
        if !lab.is_dir() {
            return Ok(());
        }
        if subset.is_some_and(|s| !s.contains(&self.config.layout.lab_dir)) {
            return Ok(());
        }
        if !lab.join(".git").exists() {
            plan.warnings.push(format!(
                "Lab repository at {} is not a git clone; removing it anyway",
                lab.display()
            ));
        }

        for path in list_entries(lab)? {
            if same_path(&path, &plan.root) {
                continue;
            }
            plan.to_remove
                .insert(ResourceItem::at(path, Ownership::InstallerCreated));
        }
        plan.lab_repo = Some(lab.to_path_buf());
        Ok(())
    }

    fn is_user_content(&self, name: &str) -> bool {
        self.config
            .uninstall
            .user_content
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Map component names to their directory names; other names pass
    /// through as entry names.
    fn resolve_names(&self, names: &[String]) -> BTreeSet<String> {
        names
            .iter()
            .map(|name| {
                self.config
                    .components
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(name))
                    .map(|c| c.dir.clone())
                    .unwrap_or_else(|| name.clone())
            })
            .collect()
    }
}

fn list_entries(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(root)
        .with_context(|| format!("Failed to read installation root: {}", root.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("Failed to read entry under {}", root.display()))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}
