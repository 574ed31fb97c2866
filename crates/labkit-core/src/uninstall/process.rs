//! Stopping processes that hold installation files open.

use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Process lookup and termination by executable name.
pub trait ProcessController {
    fn is_running(&self, name: &str) -> bool;
    /// Ask processes named `name` to exit.
    fn terminate(&self, name: &str) -> anyhow::Result<()>;
    /// Force processes named `name` to exit.
    fn kill(&self, name: &str) -> anyhow::Result<()>;
}

/// `pgrep`/`pkill` on Unix, `tasklist`/`taskkill` on Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

#[cfg(unix)]
impl ProcessController for SystemProcesses {
    fn is_running(&self, name: &str) -> bool {
        Command::new("pgrep")
            .args(["-x", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }

    fn terminate(&self, name: &str) -> anyhow::Result<()> {
        signal(name, "-TERM")
    }

    fn kill(&self, name: &str) -> anyhow::Result<()> {
        signal(name, "-KILL")
    }
}

#[cfg(unix)]
fn signal(name: &str, sig: &str) -> anyhow::Result<()> {
    // pkill exits 1 when nothing matched, which is fine here
    let status = Command::new("pkill")
        .args([sig, "-x", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("Failed to run pkill for {}", name))?;
    match status.code() {
        Some(0) | Some(1) => Ok(()),
        _ => anyhow::bail!("pkill {} {} exited with {}", sig, name, status),
    }
}

#[cfg(windows)]
impl ProcessController for SystemProcesses {
    fn is_running(&self, name: &str) -> bool {
        let image = image_name(name);
        Command::new("tasklist")
            .args(["/FI", &format!("IMAGENAME eq {}", image), "/NH"])
            .stderr(Stdio::null())
            .output()
            .is_ok_and(|out| {
                String::from_utf8_lossy(&out.stdout)
                    .to_ascii_lowercase()
                    .contains(&image.to_ascii_lowercase())
            })
    }

    fn terminate(&self, name: &str) -> anyhow::Result<()> {
        taskkill(name, false)
    }

    fn kill(&self, name: &str) -> anyhow::Result<()> {
        taskkill(name, true)
    }
}

#[cfg(windows)]
fn image_name(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(".exe") {
        name.to_string()
    } else {
        format!("{}.exe", name)
    }
}

#[cfg(windows)]
fn taskkill(name: &str, force: bool) -> anyhow::Result<()> {
    let image = image_name(name);
    let mut cmd = Command::new("taskkill");
    if force {
        cmd.arg("/F");
    }
    cmd.args(["/IM", &image])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("Failed to run taskkill for {}", image))?;
    Ok(())
}

/// Stop each named process in order: terminate, wait up to `wait`, then
/// kill. Returns a warning for every process still running afterwards.
pub fn quiesce(
    controller: &dyn ProcessController,
    names: &[String],
    wait: Duration,
) -> Vec<String> {
    let mut warnings = Vec::new();
    for name in names {
        if !controller.is_running(name) {
            continue;
        }
        tracing::info!(process = %name, "Stopping process");
        if let Err(err) = controller.terminate(name) {
            tracing::warn!(process = %name, error = %format!("{:#}", err), "Terminate failed");
        }

        let deadline = Instant::now() + wait;
        while controller.is_running(name) && Instant::now() < deadline {
            thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }

        if controller.is_running(name) {
            tracing::info!(process = %name, "Forcing process to exit");
            if let Err(err) = controller.kill(name) {
                tracing::warn!(process = %name, error = %format!("{:#}", err), "Kill failed");
            }
            if controller.is_running(name) {
                warnings.push(format!("Process still running: {}", name));
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Processes that exit after a number of terminate/kill calls.
    struct FakeProcesses {
        remaining: RefCell<HashMap<String, u32>>,
        calls: RefCell<Vec<String>>,
        ignore_terminate: bool,
    }

    impl FakeProcesses {
        fn running(names: &[&str], ignore_terminate: bool) -> Self {
            Self {
                remaining: RefCell::new(names.iter().map(|n| (n.to_string(), 1)).collect()),
                calls: RefCell::new(Vec::new()),
                ignore_terminate,
            }
        }
    }

    impl ProcessController for FakeProcesses {
        fn is_running(&self, name: &str) -> bool {
            self.remaining.borrow().get(name).is_some_and(|n| *n > 0)
        }

        fn terminate(&self, name: &str) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(format!("term:{}", name));
            if !self.ignore_terminate {
                self.remaining.borrow_mut().remove(name);
            }
            Ok(())
        }

        fn kill(&self, name: &str) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(format!("kill:{}", name));
            self.remaining.borrow_mut().remove(name);
            Ok(())
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn stops_running_processes_in_order() {
        let fake = FakeProcesses::running(&["Code", "ollama"], false);
        let warnings = quiesce(&fake, &names(&["ollama", "Code", "jupyter"]), Duration::ZERO);

        assert!(warnings.is_empty());
        assert_eq!(*fake.calls.borrow(), vec!["term:ollama", "term:Code"]);
    }

    #[test]
    fn escalates_to_kill_after_wait() {
        let fake = FakeProcesses::running(&["ollama"], true);
        let warnings = quiesce(&fake, &names(&["ollama"]), Duration::ZERO);

        assert!(warnings.is_empty());
        assert_eq!(*fake.calls.borrow(), vec!["term:ollama", "kill:ollama"]);
    }
}
