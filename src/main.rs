//! proxiff: shadow-traffic diffing proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                   PROXIFF                     │
//!  Client request     │  ┌────────┐   ┌──────────┐                   │
//!  ───────────────────┼─▶│  http  │──▶│ forward  │──▶ newer backend  │
//!                     │  │ server │   │          │──▶ current backend│
//!                     │  └────────┘   └────┬─────┘                   │
//!                     │                    ▼                         │
//!                     │             ┌────────────┐    ┌───────────┐  │
//!                     │             │ comparator │◀──▶│  plugin   │  │
//!                     │             └─────┬──────┘    │ (process) │  │
//!                     │                   ▼           └───────────┘  │
//!  Current response   │             log + metrics                    │
//!  ◀──────────────────┼──────────────────────────────────────────────│
//!                     └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use proxiff::config::{read_config, ConfigOverrides, LogFormat, ProxyConfig};
use proxiff::lifecycle::{self, signals, Shutdown};
use proxiff::observability::logging;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const COMMIT: &str = match option_env!("PROXIFF_COMMIT") {
    Some(commit) => commit,
    None => "none",
};
const BUILD_DATE: &str = match option_env!("PROXIFF_BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};

#[derive(Parser)]
#[command(name = "proxiff")]
#[command(about = "Mirror traffic to two backends and log how their responses differ", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the diffing proxy
    Start(StartArgs),
    /// Print version information
    Version,
}

#[derive(Args)]
struct StartArgs {
    /// URL of the newer server
    #[arg(long)]
    newer: Option<String>,

    /// URL of the current server
    #[arg(long)]
    current: Option<String>,

    /// Port to listen on (binds 0.0.0.0)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a comparator plugin executable
    #[arg(long)]
    plugin: Option<PathBuf>,

    /// TOML config file; flags win over its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("proxiff version {VERSION}");
            println!("commit: {COMMIT}");
            println!("built: {BUILD_DATE}");
            Ok(())
        }
        Commands::Start(args) => start(args).await,
    }
}

async fn start(args: StartArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };

    ConfigOverrides {
        newer: args.newer,
        current: args.current,
        port: args.port,
        plugin: args.plugin,
        log_format: args.log_format,
    }
    .apply(&mut config);

    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = VERSION,
        bind_address = %config.listener.bind_address,
        newer_server = %config.backends.newer,
        current_server = %config.backends.current,
        plugin = ?config.plugin.path,
        "proxiff starting"
    );

    let shutdown = Shutdown::new();
    tokio::spawn(signals::trigger_on_signal(shutdown.clone()));

    if let Err(e) = lifecycle::run(config, shutdown).await {
        tracing::error!(error = %e, "proxiff failed");
        return Err(e.into());
    }
    Ok(())
}
