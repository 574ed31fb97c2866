//! labkit - AI lab environment installer
//!
//! Usage:
//!   labkit install --volume D:\            # Install (or resume) on a volume
//!   labkit install --volume D:\ --status   # Show recorded step status
//!   labkit uninstall                       # Find and remove an installation
//!   labkit uninstall --list                # List installations

mod interactive;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labkit_core::commands::{
    InstallCommand, InstallOptions, InstallReport, NoPrompt, Prompter, UninstallCommand,
    UninstallOptions, UninstallOutcome, UninstallReport,
};
use labkit_core::config::{ConfigStore, LabConfig};
use labkit_core::discovery::DiscoveredInstallation;
use labkit_core::error::exit_code_for;
use labkit_core::status::{InstallMode, InstallationRecord, StatusStore, StepStatus};
use labkit_core::uninstall::Action;

use crate::interactive::{DialoguerPrompter, describe};

#[derive(Parser)]
#[command(name = "labkit")]
#[command(about = "AI lab environment installer", long_about = None, version)]
struct Cli {
    /// Path to labkit.toml (default: <config dir>/labkit/labkit.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the lab environment, or resume an interrupted install
    Install(InstallArgs),

    /// Remove an installation, keeping anything that predates it
    ///
    /// Without --path, labkit looks for the installation recorded by the last
    /// install and then scans all volumes.
    Uninstall(UninstallArgs),
}

#[derive(Args)]
struct InstallArgs {
    /// Mount point of the target volume (e.g. D:\ or /media/usb)
    #[arg(long, required_unless_present = "list_steps")]
    volume: Option<PathBuf>,

    /// Directory layout on the volume
    #[arg(long, value_enum, default_value = "nested")]
    mode: ModeArg,

    /// Start at this step (1-based), re-running it and everything after
    #[arg(long, value_name = "N")]
    step: Option<usize>,

    /// Show recorded progress instead of installing
    #[arg(long)]
    status: bool,

    /// List the installation steps
    #[arg(long)]
    list_steps: bool,
}

#[derive(Args)]
struct UninstallArgs {
    /// Run without prompts; fails if more than one installation is found
    #[arg(long)]
    auto: bool,

    /// Show what would be removed without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Keep user content such as Projects (default)
    #[arg(long, conflicts_with = "delete_projects")]
    keep_projects: bool,

    /// Remove user content too
    #[arg(long)]
    delete_projects: bool,

    /// Leave the lab source repository in place
    #[arg(long)]
    keep_lab: bool,

    /// Copy every item to a backup directory before removing it
    #[arg(long)]
    backup: bool,

    /// List installations and exit
    #[arg(long)]
    list: bool,

    /// Installation root to remove
    #[arg(long)]
    path: Option<PathBuf>,

    /// Only remove this component (repeatable)
    #[arg(long = "component", value_name = "NAME")]
    components: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum, Default, PartialEq, Eq, Debug)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq, Debug)]
enum ModeArg {
    /// <volume>/AI_Lab/AI_Environment
    Nested,
    /// <volume>/AI_Environment
    SideBySide,
}

impl From<ModeArg> for InstallMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Nested => InstallMode::Nested,
            ModeArg::SideBySide => InstallMode::SideBySide,
        }
    }
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labkit=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config)?;
    let store = StatusStore::with_defaults()?;
    match cli.command {
        Commands::Install(args) => run_install(config, store, args),
        Commands::Uninstall(args) => run_uninstall(config, store, args),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<LabConfig> {
    let store = match path {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default_dir()?,
    };
    let config = store.load()?;
    config.validate()?;
    Ok(config)
}

// =============================================================================
// Install
// =============================================================================

fn run_install(config: LabConfig, store: StatusStore, args: InstallArgs) -> Result<i32> {
    let command = InstallCommand::new(config, store);

    if args.list_steps {
        for (index, step) in command.steps().iter().enumerate() {
            println!("  {:>2}. {:<24} {}", index + 1, step.id(), step.description());
        }
        return Ok(0);
    }

    let volume = args
        .volume
        .ok_or_else(|| anyhow::anyhow!("--volume is required"))?;
    let mut options = InstallOptions::new(volume).with_mode(args.mode.into());
    if let Some(step) = args.step {
        options = options.with_start_step(step);
    }

    if args.status {
        match command.status(&options)? {
            Some(record) => print_record(&record),
            None => println!(
                "No installation recorded at {}",
                command.root_for(&options).display()
            ),
        }
        return Ok(0);
    }

    let report = command.run(&options)?;
    print_install_result(&report);
    Ok(report.exit_code())
}

fn print_install_result(report: &InstallReport) {
    let record = &report.record;
    if report.fresh {
        println!("Installation {} at {}", record.id, record.root_path.display());
    }
    for id in &report.summary.skipped {
        println!("  - {} (already done)", id);
    }
    for id in &report.summary.executed {
        println!("  ✓ {}", id);
    }
    match &report.summary.failed {
        Some(failure) => {
            println!("  ✗ {}: {}", failure.step_id, failure.error);
            println!();
            println!("Installation stopped. Fix the problem and run the same command to resume.");
        }
        None => println!("Installation complete."),
    }
}

fn print_record(record: &InstallationRecord) {
    println!("Installation: {}", record.id);
    println!("Root:         {}", record.root_path.display());
    println!("Mode:         {}", record.mode.as_str());
    if let Some(created) = record.created_at {
        println!("Started:      {}", created.to_rfc3339());
    }
    if let Some(updated) = record.updated_at {
        println!("Updated:      {}", updated.to_rfc3339());
    }
    println!();
    println!("  {:<24} {:<10} Completed", "Step", "Status");
    println!("  {}", "-".repeat(60));
    for step in &record.completed_steps {
        let status = match step.status {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Succeeded => "ok",
            StepStatus::Failed => "FAILED",
        };
        let completed = step
            .completed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<24} {:<10} {}", step.step_id, status, completed);
        if let Some(error) = &step.error {
            println!("      {}", error);
        }
    }
}

// =============================================================================
// Uninstall
// =============================================================================

fn run_uninstall(config: LabConfig, store: StatusStore, args: UninstallArgs) -> Result<i32> {
    let command = UninstallCommand::new(config, store);

    if args.list {
        let installations = command.list()?;
        match args.format {
            OutputFormat::Table => print_installations(&installations),
            OutputFormat::Json => print_installations_json(&installations)?,
        }
        return Ok(0);
    }

    let mut options = UninstallOptions::default()
        .with_auto(args.auto)
        .with_dry_run(args.dry_run)
        .with_keep_projects(args.keep_projects || !args.delete_projects)
        .with_backup(args.backup)
        .with_remove_lab_repo(!args.keep_lab)
        .with_components(args.components);
    if let Some(path) = args.path {
        options = options.with_path(path);
    }

    let interactive = DialoguerPrompter::new();
    let prompter: &dyn Prompter = if args.auto || args.format == OutputFormat::Json {
        &NoPrompt
    } else {
        &interactive
    };
    if args.format == OutputFormat::Json {
        options = options.with_auto(true);
    }

    let report = command.run(&options, prompter)?;
    match args.format {
        OutputFormat::Table => print_uninstall_table(&report),
        OutputFormat::Json => print_uninstall_json(&report)?,
    }
    Ok(report.exit_code())
}

fn print_installations(installations: &[DiscoveredInstallation]) {
    if installations.is_empty() {
        println!("No installations found.");
        return;
    }
    println!("Installations ({}):", installations.len());
    for (index, installation) in installations.iter().enumerate() {
        println!("  {:>2}. {}", index + 1, describe(installation));
    }
}

fn print_installations_json(installations: &[DiscoveredInstallation]) -> Result<()> {
    let entries: Vec<_> = installations
        .iter()
        .map(|i| {
            serde_json::json!({
                "id": i.record.id,
                "root": i.record.root_path,
                "volume": i.record.volume,
                "mode": i.record.mode,
                "primary": i.primary,
                "has_status": i.has_status,
                "lab_repo": i.lab_repo,
            })
        })
        .collect();
    let output = serde_json::json!({
        "schema_version": 1,
        "installations": entries,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_uninstall_table(report: &UninstallReport) {
    println!("Installation: {} ({})", report.root.display(), report.installation_id);

    if report.outcome == UninstallOutcome::Cancelled {
        println!("Uninstall cancelled. Nothing was changed.");
        return;
    }

    for result in &report.results {
        let marker = match result.action {
            Action::Removed => "✓ removed",
            Action::BackedUpThenRemoved => "✓ backed up + removed",
            Action::Skipped if report.outcome == UninstallOutcome::DryRun => "· would remove",
            Action::Skipped => "- already gone",
            Action::Failed => "✗ failed",
        };
        println!("  {:<22} {}", marker, result.item.path.display());
        if let Some(error) = &result.error {
            println!("      {}", error);
        }
    }
    for item in &report.plan.to_preserve {
        println!("  {:<22} {}", "= kept", item.path.display());
    }
    for item in &report.plan.pre_existing {
        println!("  {:<22} {}", "= pre-existing", item.path.display());
    }
    for warning in report.plan.warnings.iter().chain(report.warnings.iter()) {
        println!("  ! {}", warning);
    }
    for discrepancy in &report.discrepancies {
        println!("  ✗ {}", discrepancy);
    }
    if let Some(dir) = &report.backup_dir {
        println!("Backup: {}", dir.display());
    }

    println!();
    match report.outcome {
        UninstallOutcome::DryRun => println!(
            "Dry run: {} to remove, {} kept, {} pre-existing",
            report.plan.to_remove.len(),
            report.preserved(),
            report.pre_existing()
        ),
        _ => println!(
            "Summary: {} removed, {} kept, {} pre-existing, {} failed",
            report.removed(),
            report.preserved(),
            report.pre_existing(),
            report.failed()
        ),
    }
}

fn print_uninstall_json(report: &UninstallReport) -> Result<()> {
    let output = serde_json::json!({
        "schema_version": 1,
        "report": report,
        "summary": {
            "removed": report.removed(),
            "preserved": report.preserved(),
            "pre_existing": report.pre_existing(),
            "failed": report.failed(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninstall_flags_parse() {
        let cli = Cli::try_parse_from([
            "labkit",
            "uninstall",
            "--auto",
            "--dry-run",
            "--delete-projects",
            "--keep-lab",
            "--component",
            "ollama",
            "--component",
            "vscode",
            "--format",
            "json",
        ])
        .expect("parse uninstall");

        let Commands::Uninstall(args) = cli.command else {
            panic!("expected uninstall");
        };
        assert!(args.auto);
        assert!(args.dry_run);
        assert!(args.delete_projects);
        assert!(args.keep_lab);
        assert_eq!(args.components, vec!["ollama", "vscode"]);
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn keep_and_delete_projects_conflict() {
        let result =
            Cli::try_parse_from(["labkit", "uninstall", "--keep-projects", "--delete-projects"]);
        assert!(result.is_err());
    }

    #[test]
    fn install_requires_volume_unless_listing() {
        assert!(Cli::try_parse_from(["labkit", "install"]).is_err());
        assert!(Cli::try_parse_from(["labkit", "install", "--list-steps"]).is_ok());
    }

    #[test]
    fn install_mode_and_step_parse() {
        let cli = Cli::try_parse_from([
            "labkit",
            "install",
            "--volume",
            "/media/usb",
            "--mode",
            "side-by-side",
            "--step",
            "3",
        ])
        .expect("parse install");

        let Commands::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(args.volume, Some(PathBuf::from("/media/usb")));
        assert_eq!(InstallMode::from(args.mode), InstallMode::SideBySide);
        assert_eq!(args.step, Some(3));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["labkit", "uninstall", "--list", "--config", "lab.toml"])
            .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("lab.toml")));
    }
}
