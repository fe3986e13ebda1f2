//! # tether-cli
//!
//! Command-line interface for Tether.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tether_core::Config;

mod commands;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
}

/// Tether - restart-surviving messaging session keeper
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Override the client identity
    #[arg(short, long, value_name = "CLIENT_ID")]
    client: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Session inspection and management
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
    /// Diagnose installation issues
    Doctor,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show the stored session for the current client
    Status,
    /// List all stored sessions
    List,
    /// Print the last captured scan artifact
    Qr,
    /// Delete the stored session
    Logout {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });

    if let Some(client) = cli.client {
        config.session.client_id = client;
    }

    let ctx = AppContext { config };

    match cli.command {
        Commands::Session { action } => {
            commands::session::handle(action, &ctx).await?;
        }
        Commands::Config { action } => {
            commands::config::handle(action, &ctx).await?;
        }
        Commands::Version => {
            println!("tether {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Doctor => {
            commands::doctor::run(&ctx).await?;
        }
    }

    Ok(())
}
