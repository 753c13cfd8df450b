//! Convoy CLI, the main entry point.
//!
//! Commands:
//! - `chat`       Interactive chat or single-message mode
//! - `providers`  List the configured backends
//! - `config`     Show, locate, initialize or validate the config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "convoy",
    about = "Convoy: one agent loop, many LLM providers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Provider name from the config (default: `default_provider`)
        #[arg(short, long, env = "CONVOY_PROVIDER")]
        provider: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// System instruction
        #[arg(short, long)]
        system: Option<String>,

        /// Ask for a JSON object response (disables tools)
        #[arg(long)]
        json: bool,

        /// Root for the file tools (default: current directory)
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Do not offer any tools to the model
        #[arg(long)]
        no_tools: bool,
    },

    /// List configured providers
    Providers,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (keys redacted)
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
    /// Check the config file for errors
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Chat {
            message,
            provider,
            model,
            system,
            json,
            workspace,
            no_tools,
        } => {
            commands::chat::run(commands::chat::ChatOptions {
                message,
                provider,
                model,
                system,
                json,
                workspace,
                no_tools,
            })
            .await?
        }
        Commands::Providers => commands::providers::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
