use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod core;
mod daemon;
mod transit;
mod ui;

use crate::core::settings::Settings;

#[derive(Parser)]
#[command(name = "publika")]
#[command(author, version, about = "Realtime HSL departures, stop clusters and city bike stations")]
struct Cli {
    /// Path to config.toml (default: ~/.config/publika/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the polling daemon
    Daemon,

    /// Fetch every configured entity once and print it
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Only fetch the entity with this id
        #[arg(long)]
        entity: Option<String>,
    },

    /// Search stops by name or code
    Search {
        text: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List cancelled trips on the given routes
    Cancelled {
        #[arg(required = true)]
        routes: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Trigger daemon refresh via D-Bus
    Refresh,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn log_filter(debug: bool) -> EnvFilter {
    let default_level = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn init_logging(debug: bool) {
    tracing_subscriber::registry()
        .with(log_filter(debug))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Loads settings under a temporary subscriber; the `debug` flag is only known afterwards.
fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let bootstrap = tracing_subscriber::registry()
        .with(log_filter(false))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr));
    tracing::subscriber::with_default(bootstrap, || Settings::load(path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let settings = load_settings(cli.config.as_deref())?;
    init_logging(settings.debug);

    match cli.command {
        Commands::Daemon => daemon::run(settings).await,
        Commands::Status { json, entity } => cli::status::run(&settings, json, entity).await,
        Commands::Search { text, json } => cli::search::run(&settings, text, json).await,
        Commands::Cancelled { routes, json } => {
            cli::cancelled::run(&settings, routes, json).await
        }
        Commands::Refresh => cli::refresh::run().await,
        Commands::Completions { .. } => Ok(()),
    }
}
