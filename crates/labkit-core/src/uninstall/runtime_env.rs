//! Removing environments from a shared package runtime.
//!
//! Deleting `<runtime>/envs/<name>` by hand leaves the runtime's environment
//! registry pointing at a missing directory, so the runtime's own
//! `env remove` is tried first.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;

use crate::config::SharedRuntimeConfig;

/// Removes a named environment through the runtime that owns it.
pub trait EnvironmentRemover {
    /// `env` is the environment directory, `<runtime>/envs/<name>`.
    fn remove_env(&self, env: &Path) -> anyhow::Result<()>;
}

/// Runs `conda env remove -n <name> -y` with the runtime's own executable.
#[derive(Debug, Clone)]
pub struct CondaEnvRemover {
    executables: Vec<String>,
}

impl CondaEnvRemover {
    pub fn new(config: &SharedRuntimeConfig) -> Self {
        let mut executables = config.executables.clone();
        let batch = "condabin/conda.bat".to_string();
        if !executables.contains(&batch) {
            executables.push(batch);
        }
        Self { executables }
    }

    fn executable(&self, runtime: &Path) -> Option<PathBuf> {
        self.executables
            .iter()
            .map(|rel| runtime.join(rel))
            .find(|path| path.is_file())
    }
}

impl EnvironmentRemover for CondaEnvRemover {
    fn remove_env(&self, env: &Path) -> anyhow::Result<()> {
        let (runtime, name) = split_env_path(env)
            .ok_or_else(|| anyhow::anyhow!("Not an environment path: {}", env.display()))?;
        let exe = self.executable(runtime).ok_or_else(|| {
            anyhow::anyhow!("No runtime executable found under {}", runtime.display())
        })?;

        tracing::info!(env = %name, exe = %exe.display(), "Removing runtime environment");
        let output = Command::new(&exe)
            .args(["env", "remove", "-n", name, "-y"])
            .output()
            .with_context(|| format!("Failed to run {}", exe.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} env remove {} exited with {}: {}",
                exe.display(),
                name,
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

/// `<runtime>/envs/<name>` into `(runtime, name)`.
fn split_env_path(env: &Path) -> Option<(&Path, &str)> {
    let name = env.file_name()?.to_str()?;
    let envs = env.parent()?;
    if envs.file_name()? != OsStr::new("envs") {
        return None;
    }
    Some((envs.parent()?, name))
}
