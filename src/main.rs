use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use autopilot_core_types::Settings;
use autopilot_scheduler::{delay_until, metrics, ScheduleTarget};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticket_autopilot::config::{self, apply_env_overrides, load_or_init, resolve_config_path};
use ticket_autopilot::scenario::{render_human, run_scenario, Scenario};

/// Ticket Autopilot - navigation-reactive ticket selection and application
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file path (YAML or JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,

    /// Log record format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file against the in-memory page
    Simulate(SimulateArgs),

    /// Show when the next flow would start under the current settings
    Schedule,

    /// Settings file management
    Config(ConfigArgs),
}

#[derive(Args)]
struct SimulateArgs {
    /// Scenario file (YAML or JSON)
    scenario: PathBuf,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,

    /// Write default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the settings file location
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(&cli.log_level, cli.debug, cli.log_format, cli.log_file.as_deref())?;

    info!("Starting Ticket Autopilot v{}", env!("CARGO_PKG_VERSION"));

    let config_path = resolve_config_path(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Simulate(args) => cmd_simulate(args, &config_path, cli.output).await,
        Commands::Schedule => cmd_schedule(&config_path, cli.output),
        Commands::Config(args) => cmd_config(args, &config_path),
    };

    match result {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(
    level: &str,
    debug: bool,
    format: LogFormat,
    log_file: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let (file_writer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(file_writer.map(|writer| {
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
            }))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .with(file_writer.map(|writer| {
                tracing_subscriber::fmt::layer().json().with_writer(writer)
            }))
            .init(),
    }

    Ok(guard)
}

fn load_effective_settings(path: &Path) -> Result<Settings> {
    let settings = load_or_init(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    Ok(apply_env_overrides(&settings))
}

async fn cmd_simulate(args: SimulateArgs, config_path: &Path, output: OutputFormat) -> Result<()> {
    let settings = load_effective_settings(config_path)?;
    let scenario = Scenario::from_path(&args.scenario)?;

    let report = run_scenario(scenario, &settings).await?;

    match output {
        OutputFormat::Human => print!("{}", render_human(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    let counters = metrics::snapshot();
    info!(
        dispatched = counters.dispatched,
        unrouted = counters.unrouted,
        suppressed = counters.suppressed,
        completed = counters.completed,
        failed = counters.failed,
        aborted = counters.aborted,
        "Scenario finished"
    );
    Ok(())
}

fn cmd_schedule(config_path: &Path, output: OutputFormat) -> Result<()> {
    let settings = load_effective_settings(config_path)?;
    let target = ScheduleTarget::from_settings(&settings.common)
        .context("Start schedule is malformed; flows would start immediately")?;
    let now = Local::now();
    let delay_ms = delay_until(target.as_ref(), &now);
    let start_at = now + chrono::Duration::milliseconds(delay_ms as i64);

    match output {
        OutputFormat::Human => {
            if target.is_none() {
                println!("No start schedule; flows start immediately");
            } else if delay_ms == 0 {
                println!("Start time has passed; flows start immediately");
            } else {
                println!(
                    "Flows start at {} (in {})",
                    start_at.format("%Y-%m-%d %H:%M:%S"),
                    humantime::format_duration(Duration::from_millis(delay_ms))
                );
            }
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "startDate": settings.common.start_date,
                "startTime": settings.common.start_time,
                "scheduled": target.is_some(),
                "delayMs": delay_ms,
                "startAt": start_at.to_rfc3339(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs, config_path: &Path) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let settings = load_effective_settings(config_path)?;
            println!("Current Settings ({}):", config_path.display());
            println!("{}", serde_yaml::to_string(&settings)?);
        }

        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            config::save_settings(config_path, &Settings::default())?;
            println!("Wrote default settings to {}", config_path.display());
        }

        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }

    Ok(())
}
