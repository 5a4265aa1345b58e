//! winfw - Windows Firewall reconciliation CLI
//!
//! # Usage
//!
//! ```bash
//! winfw show                          # List live firewall rules
//! winfw groups                        # Show rule groups and their enabled state
//! winfw profiles                      # Show domain/private/public profile settings
//! winfw global                        # Show global IPsec settings
//! winfw plan firewall.json            # Show what apply would change
//! winfw apply firewall.json           # Converge the firewall to the manifest
//! winfw apply firewall.json --dry-run # Decide and log, change nothing
//! winfw init-config                   # Write a default config file
//! ```
//!
//! Mutations require an elevated (Administrator) prompt.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use winfw::audit::AuditLog;
use winfw::config::{AppConfig, load_config, save_config};
use winfw::core::bridge::resolve;
use winfw::core::diff::Change;
use winfw::core::error::ToolErrorPattern;
use winfw::core::manifest::load_manifest;
use winfw::core::reconcile::{PassReport, Reconciler};
use winfw::core::settings::{Settings, SettingsScope};
use winfw::invoker::{SystemRunner, Tools};
use winfw::utils::truncate_string;
use winfw::{Error, Result};

#[derive(Parser)]
#[command(name = "winfw", version)]
#[command(about = "Reconcile Windows Firewall rules and settings against a manifest", long_about = None)]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to winfw.log in the state directory instead of stderr
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List live firewall rules
    Show,
    /// Show rule groups and whether all their rules are enabled
    Groups,
    /// Show domain, private and public profile settings
    Profiles,
    /// Show global firewall settings
    Global,
    /// Show what applying a manifest would change
    Plan {
        /// Desired-state manifest (JSON)
        manifest: PathBuf,
    },
    /// Converge the firewall to a manifest
    Apply {
        /// Desired-state manifest (JSON)
        manifest: PathBuf,
        /// Decide and log every change without making it
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool, log_file: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    if log_file
        && let Some(mut log_path) = winfw::utils::get_state_dir()
    {
        log_path.push("winfw.log");
        if let Ok(file) = std::fs::File::create(log_path) {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(file)
                .init();
            return;
        }
    }

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let _ = winfw::utils::ensure_dirs();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file);

    // every invocation is awaited in turn; one thread is enough
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli.command, cli.config.as_deref())) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn report_error(error: &Error) {
    eprintln!("Error: {error}");
    if let Error::Invocation { message, .. } = error {
        let translation = ToolErrorPattern::match_error(message);
        eprintln!("  {}", translation.user_message);
        for suggestion in &translation.suggestions {
            eprintln!("  - {suggestion}");
        }
        if let Some(url) = &translation.help_url {
            eprintln!("  See: {url}");
        }
    }
}

fn reconciler(config: &AppConfig, dry_run: bool) -> Result<Reconciler<SystemRunner>> {
    let bridge = resolve(&config.bridge)?;
    let tools = Tools::new(bridge, config.netsh.clone());
    let mut reconciler = Reconciler::new(SystemRunner, tools).dry_run(dry_run);
    if config.audit_enabled && !dry_run {
        match AuditLog::new() {
            Ok(audit) => reconciler = reconciler.with_audit(audit),
            Err(e) => tracing::warn!("Audit log unavailable: {e}"),
        }
    }
    Ok(reconciler)
}

/// Settings commands only need `netsh`, so a missing bridge is not fatal there.
fn settings_reconciler(config: &AppConfig) -> Reconciler<SystemRunner> {
    let bridge = resolve(&config.bridge).unwrap_or_else(|_| winfw::core::bridge::Bridge {
        interpreter: config.bridge.interpreter.clone(),
        script: PathBuf::new(),
    });
    Reconciler::new(SystemRunner, Tools::new(bridge, config.netsh.clone()))
}

fn print_settings(settings: &Settings) {
    println!("{}:", settings.name);
    for (key, value) in &settings.values {
        println!("  {key:<32} {value}");
    }
}

fn print_report(report: &PassReport) {
    let verb = if report.dry_run { "would be" } else { "" };
    for outcome in &report.rules {
        match &outcome.result {
            Ok(kind) => println!("  {:<40} {verb} {kind}", outcome.name),
            Err(e) => println!("  {:<40} FAILED: {e}", outcome.name),
        }
    }
    for outcome in &report.settings {
        match &outcome.result {
            Ok(changes) if changes.is_empty() => println!("  {:<40} in sync", outcome.scope),
            Ok(changes) => {
                for change in changes {
                    println!(
                        "  {:<40} {verb} set {} = {}",
                        outcome.scope, change.key, change.desired
                    );
                }
            }
            Err(e) => println!("  {:<40} FAILED: {e}", outcome.scope),
        }
    }
    println!(
        "{} changed, {} failed",
        report.changed(),
        report.failed()
    );
}

async fn handle_cli(command: Commands, config_path: Option<&Path>) -> Result<bool> {
    if let Commands::InitConfig { force } = command {
        return init_config(config_path, force).await;
    }

    let config = load_config(config_path).await?;

    match command {
        Commands::Show => {
            let reconciler = reconciler(&config, false)?;
            let mut rules = reconciler.fetch_rules().await?;
            rules.sort_by(|a, b| a.name.cmp(&b.name));
            println!(
                "{:<48} {:<8} {:<9} {:<6} {:<8} {}",
                "NAME", "ENABLED", "DIRECTION", "ACTION", "PROTO", "LOCAL PORT"
            );
            for rule in &rules {
                println!(
                    "{:<48} {:<8} {:<9} {:<6} {:<8} {}",
                    truncate_string(&rule.name, 48),
                    rule.enabled.map(|v| v.to_string()).unwrap_or_default(),
                    rule.direction.map(|v| v.to_string()).unwrap_or_default(),
                    rule.action.map(|v| v.to_string()).unwrap_or_default(),
                    rule.protocol.as_deref().unwrap_or_default(),
                    rule.local_port.as_deref().unwrap_or_default(),
                );
            }
            println!("{} rules", rules.len());
        }
        Commands::Groups => {
            let mut reconciler = reconciler(&config, false)?;
            for group in reconciler.groups().await? {
                println!(
                    "{:<56} {:<4} ({} rules)",
                    truncate_string(&group.name, 56),
                    group.enabled,
                    group.members
                );
            }
        }
        Commands::Profiles => {
            for profile in settings_reconciler(&config).profiles().await? {
                print_settings(&profile);
            }
        }
        Commands::Global => {
            print_settings(&settings_reconciler(&config).global().await?);
        }
        Commands::Plan { manifest } => {
            let manifest = load_manifest(&manifest).await?;
            let mut reconciler = reconciler(&config, true)?;

            for rule in &manifest.rules {
                let plan = reconciler.plan(rule).await?;
                let action = match &plan.change {
                    Change::Create(_) => "create",
                    Change::Delete(_) => "delete",
                    Change::Replace { .. } => "replace",
                    Change::Unchanged => continue,
                };
                println!("{action} rule '{}'", rule.name);
                if let Some(drift) = plan.drift {
                    print!("{drift}");
                }
            }

            for desired in manifest.profiles.iter().chain(manifest.global.iter()) {
                let scope = SettingsScope::from_name(&desired.name)?;
                for change in reconciler.plan_settings(scope, desired).await? {
                    println!(
                        "set {scope} {}: {} -> {}",
                        change.key,
                        change.current.map(|v| v.to_string()).unwrap_or_else(|| "(unset)".into()),
                        change.desired
                    );
                }
            }
        }
        Commands::Apply { manifest, dry_run } => {
            let manifest = load_manifest(&manifest).await?;
            let mut reconciler = reconciler(&config, dry_run)?;
            let report = reconciler.apply(&manifest).await?;
            print_report(&report);
            return Ok(report.is_success());
        }
        Commands::InitConfig { .. } => {}
    }

    Ok(true)
}

async fn init_config(config_path: Option<&Path>, force: bool) -> Result<bool> {
    let path = config_path
        .map(Path::to_path_buf)
        .or_else(winfw::utils::default_config_path)
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Config directory not found",
            ))
        })?;

    if !force && tokio::fs::try_exists(&path).await? {
        eprintln!("{} already exists (use --force to overwrite)", path.display());
        return Ok(false);
    }

    save_config(&AppConfig::default(), &path).await?;
    println!("Wrote {}", path.display());
    Ok(true)
}
