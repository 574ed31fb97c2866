//! Built-in installation steps.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;

use super::orchestrator::{Step, StepContext, StepOutput};
use crate::config::{ComponentConfig, LabConfig};

pub const ACTIVATION_SCRIPT: &str = "activate_ai_env.bat";
pub const INSTALLATION_INFO: &str = "installation_info.json";

/// The standard sequence: layout, one step per component, activation
/// script, installation info.
pub fn default_steps(config: &LabConfig) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = vec![Box::new(PrepareLayout)];
    steps.extend(
        config
            .components
            .iter()
            .cloned()
            .map(|c| Box::new(ComponentStep::new(c)) as Box<dyn Step>),
    );
    steps.push(Box::new(ActivationScript));
    steps.push(Box::new(InstallationInfo));
    steps
}

/// Create `path` and any missing parents, returning the directories that
/// did not exist before.
fn create_dirs(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let missing: Vec<PathBuf> = path
        .ancestors()
        .take_while(|p| !p.exists())
        .map(Path::to_path_buf)
        .collect();
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    Ok(missing.into_iter().rev().collect())
}

pub struct PrepareLayout;

impl Step for PrepareLayout {
    fn id(&self) -> &str {
        "prepare_layout"
    }

    fn description(&self) -> &str {
        "Create installation directory layout"
    }

    fn run(&self, ctx: &StepContext<'_>) -> anyhow::Result<StepOutput> {
        let mut created = Vec::new();
        if !ctx.root.exists() {
            created.push(ctx.root.to_path_buf());
        }
        fs::create_dir_all(ctx.root)
            .with_context(|| format!("Failed to create root: {}", ctx.root.display()))?;
        for dir in &ctx.config.layout.standard_dirs {
            let path = ctx.root.join(dir);
            if !path.exists() {
                fs::create_dir(&path)
                    .with_context(|| format!("Failed to create directory: {}", path.display()))?;
                created.push(path);
            }
        }
        Ok(StepOutput::created(created))
    }
}

/// Installs one third-party component by running its configured command.
pub struct ComponentStep {
    id: String,
    description: String,
    component: ComponentConfig,
}

impl ComponentStep {
    pub fn new(component: ComponentConfig) -> Self {
        Self {
            id: format!("component:{}", component.name),
            description: format!("Install {}", component.name),
            component,
        }
    }
}

impl Step for ComponentStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self, ctx: &StepContext<'_>) -> anyhow::Result<StepOutput> {
        let dir = ctx.root.join(&self.component.dir);
        let created = create_dirs(&dir)?;

        let Some((program, args)) = self.component.command.split_first() else {
            tracing::debug!(component = %self.component.name, "No installer command configured");
            return Ok(StepOutput::created(created));
        };

        let resolved = which::which(program)
            .with_context(|| format!("Installer command not found: {}", program))?;
        tracing::info!(
            component = %self.component.name,
            command = %resolved.display(),
            "Running component installer"
        );
        let output = Command::new(&resolved)
            .args(args)
            .current_dir(ctx.root)
            .env("LABKIT_TARGET", ctx.root)
            .env("LABKIT_COMPONENT_DIR", &dir)
            .output()
            .with_context(|| format!("Failed to run installer for {}", self.component.name))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Installer for {} exited with {}: {}",
                self.component.name,
                output.status,
                stderr.trim()
            );
        }
        Ok(StepOutput::created(created))
    }
}

/// Writes the batch script that puts the installed tools on PATH.
pub struct ActivationScript;

impl ActivationScript {
    pub fn render(root: &Path, config: &LabConfig) -> String {
        let runtime = &config.shared_runtime;
        let mut path_dirs = vec![
            format!("%AI_ENV_PATH%\\{}", runtime.portable_dir),
            format!("%AI_ENV_PATH%\\{}\\Scripts", runtime.portable_dir),
        ];
        path_dirs.extend(
            config
                .components
                .iter()
                .filter(|c| c.dir != runtime.portable_dir)
                .map(|c| format!("%AI_ENV_PATH%\\{}", c.dir)),
        );

        let mut script = String::new();
        script.push_str("@echo off\r\n");
        script.push_str(&format!("title AI Environment - {}\r\n\r\n", runtime.env_name));
        script.push_str(&format!("set \"AI_ENV_PATH={}\"\r\n", root.display()));
        script.push_str(&format!("set \"PATH={};%PATH%\"\r\n", path_dirs.join(";")));
        script.push_str(&format!(
            "call \"%AI_ENV_PATH%\\{}\\Scripts\\activate.bat\" {}\r\n\r\n",
            runtime.portable_dir, runtime.env_name
        ));
        script.push_str("set \"OLLAMA_HOST=127.0.0.1:11434\"\r\n");
        script.push_str("set \"OLLAMA_MODELS=%AI_ENV_PATH%\\Models\"\r\n\r\n");
        script.push_str(&format!("echo AI Environment activated ({})\r\n", runtime.env_name));
        script.push_str("cmd /k\r\n");
        script
    }
}

impl Step for ActivationScript {
    fn id(&self) -> &str {
        "activation_script"
    }

    fn description(&self) -> &str {
        "Write environment activation script"
    }

    fn run(&self, ctx: &StepContext<'_>) -> anyhow::Result<StepOutput> {
        let path = ctx.root.join(ACTIVATION_SCRIPT);
        let existed = path.exists();
        fs::write(&path, Self::render(ctx.root, ctx.config))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(StepOutput::created((!existed).then_some(path)))
    }
}

/// Writes `installation_info.json`, the human-facing installation summary.
pub struct InstallationInfo;

impl Step for InstallationInfo {
    fn id(&self) -> &str {
        "installation_info"
    }

    fn description(&self) -> &str {
        "Write installation info"
    }

    fn run(&self, ctx: &StepContext<'_>) -> anyhow::Result<StepOutput> {
        let path = ctx.root.join(INSTALLATION_INFO);
        let existed = path.exists();
        let info = serde_json::json!({
            "installation_id": ctx.installation_id,
            "installation_path": ctx.root,
            "volume": ctx.volume,
            "mode": ctx.mode,
            "installed_at": chrono::Utc::now().to_rfc3339(),
            "installer_version": env!("CARGO_PKG_VERSION"),
            "environment": ctx.config.shared_runtime.env_name,
            "components": ctx.config.components.iter().map(|c| &c.name).collect::<Vec<_>>(),
        });
        let content =
            serde_json::to_string_pretty(&info).context("Failed to serialize installation info")?;
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(StepOutput::created((!existed).then_some(path)))
    }
}
