//! Hubreg - locate a catalog hub and register remote indexes with it
//!
//! Exit codes: 0 on success, 1 on operational failure, 2 on usage errors.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use hubreg_core::{HubConfig, HubError};

mod ready_cli;
mod register_cli;

/// Trace modules for structured tracing
#[derive(Debug, Clone, ValueEnum)]
enum TraceModule {
    Hub,
    Index,
    Readiness,
    Registration,
    Transport,
    All,
}

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "hubreg",
    about = "Locate a catalog hub and register a remote index with it",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Hub address (overrides HUB_BASE and the config file)
    #[clap(long, global = true)]
    hub: Option<String>,

    /// Bearer token (overrides HUB_TOKEN and the config file)
    #[clap(long, global = true)]
    token: Option<String>,

    /// Configuration file path
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Enable JSON tracing (comma-separated: hub,index,readiness,registration,transport,all)
    #[clap(long, value_delimiter = ',', global = true)]
    trace: Vec<TraceModule>,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,
}

#[derive(Parser, Debug)]
enum Command {
    /// Register an index, ingest it and install an entity (run-full-registration)
    Register(register_cli::RegisterArgs),

    /// Wait for the hub to report healthy (check-readiness)
    Ready(ready_cli::ReadyArgs),

    /// Check the hub can reach a remote index (probe-remote-connection)
    Probe(register_cli::ProbeArgs),
}

fn initialize_tracing(log_level: &LogLevel, trace_modules: &[TraceModule]) {
    let mut filter = EnvFilter::new(log_level.to_filter_directive());

    for module in trace_modules {
        let directive = match module {
            TraceModule::Hub => "hubreg_core::hub=trace",
            TraceModule::Index => "hubreg_core::index=trace",
            TraceModule::Readiness => "hubreg_core::readiness=trace",
            TraceModule::Registration => "hubreg_core::registration=trace",
            TraceModule::Transport => "hubreg_core::transport=trace",
            TraceModule::All => "hubreg_core=trace",
        };

        if let Ok(parsed) = directive.parse() {
            filter = filter.add_directive(parsed);
        }
    }

    // Logs go to stderr; stdout carries reports only
    if !trace_modules.is_empty() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();

        tracing::info!(trace_modules = ?trace_modules, "Hubreg tracing enabled");
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Config file and environment, then global flags on top
fn load_config(cli: &Cli) -> Result<HubConfig> {
    let mut config = HubConfig::load(cli.config.as_deref())?;

    if let Some(hub) = &cli.hub {
        config.hub_base = hub.clone();
    }
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }

    Ok(config)
}

/// Exit code for a failed command: the first hub error in the chain decides
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<HubError>())
        .map_or(1, |hub_error| hub_error.exit_code() as u8)
}

/// Log a failed run once; hub negotiation failures go to the `topology` target
fn log_failure(e: &anyhow::Error) {
    match e.downcast_ref::<HubError>() {
        Some(hub_error) if hub_error.is_topology() => {
            error!(target: "topology", "Hub negotiation failed: {e:#}")
        }
        _ => error!("{e:#}"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Register(args) => args.execute(config).await,
        Command::Ready(args) => args.execute(config).await,
        Command::Probe(args) => args.execute(config).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, &cli.trace);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_failure(&e);
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}
