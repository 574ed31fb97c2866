//! labkit.toml schema.
//!
//! Every field has a default so an empty or missing file yields the stock
//! AI lab layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::status::InstallMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub layout: LayoutConfig,
    pub signatures: SignatureConfig,
    pub uninstall: UninstallConfig,
    pub discovery: DiscoveryConfig,
    pub shared_runtime: SharedRuntimeConfig,
    #[serde(rename = "component")]
    pub components: Vec<ComponentConfig>,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            signatures: SignatureConfig::default(),
            uninstall: UninstallConfig::default(),
            discovery: DiscoveryConfig::default(),
            shared_runtime: SharedRuntimeConfig::default(),
            components: default_components(),
        }
    }
}

impl LabConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.layout.root_dir.trim().is_empty() {
            anyhow::bail!("layout.root_dir must not be empty");
        }
        if self.layout.lab_dir.trim().is_empty() {
            anyhow::bail!("layout.lab_dir must not be empty");
        }
        if self.uninstall.delete_attempts == 0 {
            anyhow::bail!("uninstall.delete_attempts must be at least 1");
        }
        if self.discovery.max_parallel == 0 {
            anyhow::bail!("discovery.max_parallel must be at least 1");
        }
        let mut seen = std::collections::HashSet::new();
        for component in &self.components {
            if component.name.trim().is_empty() {
                anyhow::bail!("component name must not be empty");
            }
            if !seen.insert(component.name.as_str()) {
                anyhow::bail!("Duplicate component name: {}", component.name);
            }
            if component.dir.contains('/') || component.dir.contains('\\') {
                anyhow::bail!(
                    "component '{}' dir must be a single directory name, got '{}'",
                    component.name,
                    component.dir
                );
            }
        }
        Ok(())
    }
}

/// Directory names of the two supported layouts.
///
/// Nested: `<volume>/<lab_dir>/<root_dir>`. Side-by-side: `<volume>/<root_dir>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub root_dir: String,
    pub lab_dir: String,
    /// Directories `prepare_layout` creates under the root.
    pub standard_dirs: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            root_dir: "AI_Environment".to_string(),
            lab_dir: "AI_Lab".to_string(),
            standard_dirs: ["Projects", "Logs", "Models", "Tools", "Scripts", "downloads"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl LayoutConfig {
    /// Installation root for `mode` on the volume mounted at `mount`.
    pub fn root_for(&self, mount: &Path, mode: InstallMode) -> PathBuf {
        match mode {
            InstallMode::Nested => mount.join(&self.lab_dir).join(&self.root_dir),
            InstallMode::SideBySide => mount.join(&self.root_dir),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    pub files: Vec<String>,
    pub dirs: Vec<String>,
    /// Entries marking the lab source repository; one must be present.
    pub lab_markers: Vec<String>,
    /// Directory of the repository that must hold at least one `*.py` module.
    pub lab_source_dir: String,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            files: vec![
                "activate_ai_env.bat".to_string(),
                "installation_info.json".to_string(),
                "installation_status.json".to_string(),
            ],
            dirs: vec![
                "Miniconda".to_string(),
                "VSCode".to_string(),
                "Ollama".to_string(),
            ],
            lab_markers: vec![
                ".git".to_string(),
                "run_ai_env.bat".to_string(),
                "activate_ai_env.py".to_string(),
            ],
            lab_source_dir: "src".to_string(),
        }
    }
}

impl SignatureConfig {
    /// A directory carries the signature when at least one marker file or
    /// marker directory is present.
    pub fn matches(&self, root: &Path) -> bool {
        root.is_dir()
            && (self.files.iter().any(|f| root.join(f).is_file())
                || self.dirs.iter().any(|d| root.join(d).is_dir()))
    }

    /// A lab repository has a marker entry and Python modules in its
    /// source directory.
    pub fn matches_lab(&self, path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        let has_marker = self.lab_markers.iter().any(|m| path.join(m).exists());
        let source = path.join(&self.lab_source_dir);
        let has_modules = std::fs::read_dir(&source).is_ok_and(|entries| {
            entries
                .flatten()
                .any(|e| e.path().extension().is_some_and(|ext| ext == "py"))
        });
        has_marker && has_modules
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UninstallConfig {
    /// Top-level names treated as user content.
    pub user_content: Vec<String>,
    /// Process names stopped before deletion, in this order.
    pub processes: Vec<String>,
    pub quiesce_wait_ms: u64,
    pub delete_attempts: u32,
    pub delete_delay_ms: u64,
}

impl Default for UninstallConfig {
    fn default() -> Self {
        Self {
            user_content: vec!["Projects".to_string()],
            processes: vec![
                "ollama".to_string(),
                "Code".to_string(),
                "jupyter".to_string(),
                "jupyter-lab".to_string(),
                "streamlit".to_string(),
            ],
            quiesce_wait_ms: 3_000,
            delete_attempts: 3,
            delete_delay_ms: 500,
        }
    }
}

impl UninstallConfig {
    pub fn quiesce_wait(&self) -> Duration {
        Duration::from_millis(self.quiesce_wait_ms)
    }

    pub fn delete_delay(&self) -> Duration {
        Duration::from_millis(self.delete_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub max_parallel: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { max_parallel: 4 }
    }
}

/// The package-environment runtime that may be shared across installations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedRuntimeConfig {
    /// Directory name of the portable copy under the installation root.
    pub portable_dir: String,
    /// Environment the installer creates inside the runtime.
    pub env_name: String,
    /// Executable paths relative to a runtime root that prove it is installed.
    pub executables: Vec<String>,
    /// Systemwide locations checked for a pre-existing runtime. A leading `~`
    /// expands to the home directory.
    pub shared_locations: Vec<PathBuf>,
}

impl Default for SharedRuntimeConfig {
    fn default() -> Self {
        Self {
            portable_dir: "Miniconda".to_string(),
            env_name: "AI2025".to_string(),
            executables: vec!["Scripts/conda.exe".to_string(), "bin/conda".to_string()],
            shared_locations: vec![
                PathBuf::from("C:/ProgramData/miniconda3"),
                PathBuf::from("C:/ProgramData/Anaconda3"),
                PathBuf::from("~/miniconda3"),
                PathBuf::from("~/anaconda3"),
                PathBuf::from("/opt/miniconda3"),
            ],
        }
    }
}

/// A third-party component installed by an external command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    /// Directory under the root the component installs into.
    pub dir: String,
    /// Installer command and arguments. Empty means the component only gets
    /// its directory created.
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_components() -> Vec<ComponentConfig> {
    [
        ("miniconda", "Miniconda"),
        ("vscode", "VSCode"),
        ("ollama", "Ollama"),
    ]
    .iter()
    .map(|(name, dir)| ComponentConfig {
        name: name.to_string(),
        dir: dir.to_string(),
        command: Vec::new(),
    })
    .collect()
}
