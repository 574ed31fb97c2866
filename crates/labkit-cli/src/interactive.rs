//! Interactive prompts for uninstall runs.
//!
//! Uses dialoguer for terminal UI prompts.

use std::cell::RefCell;
use std::io::{self, Write};

use anyhow::Result;
use console::style;
use dialoguer::{Confirm as ConfirmPrompt, Select, theme::ColorfulTheme};

use labkit_core::commands::Prompter;
use labkit_core::discovery::DiscoveredInstallation;
use labkit_core::uninstall::{Confirm, UninstallPlan};

/// Terminal prompter for choosing an installation and approving the plan.
pub struct DialoguerPrompter<W: Write = io::Stdout> {
    /// Output writer (for testing)
    writer: RefCell<W>,
    /// Theme for dialoguer prompts
    theme: ColorfulTheme,
}

impl DialoguerPrompter<io::Stdout> {
    pub fn new() -> Self {
        Self {
            writer: RefCell::new(io::stdout()),
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for DialoguerPrompter<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> DialoguerPrompter<W> {
    #[cfg(test)]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer: RefCell::new(writer),
            theme: ColorfulTheme::default(),
        }
    }

    #[cfg(test)]
    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }

    /// Write the plan summary shown before confirmation.
    pub fn print_plan(&self, plan: &UninstallPlan) -> Result<()> {
        let mut w = self.writer.borrow_mut();
        writeln!(w)?;
        writeln!(w, "{}", style("  Uninstall Plan").bold().cyan())?;
        writeln!(w, "  ───────────────────────────")?;
        writeln!(w, "  Root: {}", plan.root.display())?;
        if let Some(lab) = &plan.lab_repo {
            writeln!(w, "  Lab repository: {}", lab.display())?;
        }
        writeln!(w)?;

        writeln!(w, "  {} ({}):", style("Remove").red(), plan.to_remove.len())?;
        for item in &plan.to_remove {
            writeln!(w, "    - {}", item.path.display())?;
        }
        if !plan.to_preserve.is_empty() {
            writeln!(w, "  {} ({}):", style("Keep").green(), plan.to_preserve.len())?;
            for item in &plan.to_preserve {
                writeln!(w, "    - {}", item.path.display())?;
            }
        }
        if !plan.pre_existing.is_empty() {
            writeln!(
                w,
                "  {} ({}):",
                style("Pre-existing").yellow(),
                plan.pre_existing.len()
            )?;
            for item in &plan.pre_existing {
                writeln!(w, "    - {}", item.path.display())?;
            }
        }
        for warning in &plan.warnings {
            writeln!(w, "  {} {}", style("!").yellow(), warning)?;
        }
        writeln!(w)?;
        Ok(())
    }
}

impl<W: Write> Confirm for DialoguerPrompter<W> {
    fn confirm(&self, plan: &UninstallPlan) -> Result<bool> {
        self.print_plan(plan)?;
        if plan.to_remove.is_empty() {
            return Ok(true);
        }
        let confirmed = ConfirmPrompt::with_theme(&self.theme)
            .with_prompt("Proceed with uninstall?")
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}

impl<W: Write> Prompter for DialoguerPrompter<W> {
    fn select(&self, installations: &[DiscoveredInstallation]) -> Result<Option<usize>> {
        let items: Vec<String> = installations.iter().map(describe).collect();
        let selection = Select::with_theme(&self.theme)
            .with_prompt("Multiple installations found. Which one should be removed?")
            .items(&items)
            .default(0)
            .interact_opt()?;
        Ok(selection)
    }
}

/// One-line description of an installation for selection lists.
pub fn describe(installation: &DiscoveredInstallation) -> String {
    let record = &installation.record;
    let mut line = format!("{} ({})", record.root_path.display(), record.mode.as_str());
    if installation.primary {
        line.push_str(" [current]");
    }
    if !installation.has_status {
        line.push_str(" [no status]");
    }
    line
}
