//! Command-line client for LiveSync.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use shared::config::server::Config;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;

use commands::{
    Context,
    messages::{DeleteArgs, EditArgs, HistoryArgs, ReadArgs, SendArgs},
    follow::FollowArgs,
};

/// LiveSync CLI
#[derive(Parser)]
#[command(name = "livesync")]
#[command(about = "Follow LiveSync conversations and manage messages", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Server base URL; defaults to `server.public_base_url` from the configuration
    #[arg(long, global = true)]
    server: Option<String>,

    /// Bearer token sent with every request; defaults to `auth.bearer_token`
    #[arg(long, global = true)]
    token: Option<String>,

    /// Configuration file (YAML, JSON, or TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the LiveSync server in this process
    Serve {
        /// Port to bind
        #[arg(long, short)]
        port: Option<u16>,
    },
    /// Follow a conversation live
    Follow(FollowArgs),
    /// Print the current messages of a conversation
    History(HistoryArgs),
    /// Post a message
    Send(SendArgs),
    /// Replace the content of a message
    Edit(EditArgs),
    /// Delete a message
    Delete(DeleteArgs),
    /// Mark a message as read
    Read(ReadArgs),
    /// Generate the OpenAPI specification
    Spec {
        /// `json`, `yaml`, or a file path; YAML on stdout when omitted
        output_path: Option<String>,
    },
    /// Generate shell completion scripts for the CLI
    Completion {
        /// Shell to generate for (bash, zsh, fish, powershell, elvish)
        #[arg(long, short)]
        shell: clap_complete::Shell,
    },
    /// Generate a configuration file with default values
    Config {
        /// Output format: yaml, json, or toml
        #[arg(long, short, default_value = "yaml")]
        format: String,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn initialize_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_with_config(global: GlobalArgs, command: Commands) -> anyhow::Result<()> {
    let port_override = match &command {
        Commands::Serve { port } => *port,
        _ => None,
    };
    let config_path = global.config.or_else(commands::config::default_config_path);
    let config = Config::load_config(config_path, port_override)
        .context("failed to load configuration")?;
    let ctx = Context::new(config, global.server, global.token);

    match command {
        Commands::Serve { .. } => server::server::run(ctx.config).await,
        Commands::Follow(args) => commands::follow::handle_follow(&ctx, args).await,
        Commands::History(args) => commands::messages::handle_history(&ctx, args).await,
        Commands::Send(args) => commands::messages::handle_send(&ctx, args).await,
        Commands::Edit(args) => commands::messages::handle_edit(&ctx, args).await,
        Commands::Delete(args) => commands::messages::handle_delete(&ctx, args).await,
        Commands::Read(args) => commands::messages::handle_read(&ctx, args).await,
        Commands::Spec { .. } | Commands::Completion { .. } | Commands::Config { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    initialize_tracing(cli.global.verbose);

    match cli.command {
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
            Ok(())
        }
        Commands::Config { format, output } => {
            commands::config::generate_config(&format, output.as_deref())
        }
        Commands::Spec { output_path } => {
            server::commands::spec::generate_spec(output_path.as_deref())
        }
        command => run_with_config(cli.global, command).await,
    }
}
