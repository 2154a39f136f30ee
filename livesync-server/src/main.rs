#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.

//! Entry point for the LiveSync server binary.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use server::{commands::spec::generate_spec, server::run};
use shared::config::server::Config;

#[derive(Parser)]
#[command(name = "livesync-server")]
#[command(about = "LiveSync message server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind; overrides the config file and environment
        #[arg(long, short)]
        port: Option<u16>,

        /// Path to a YAML, JSON, or TOML configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Print or write the OpenAPI document
    Spec {
        /// `json`, `yaml`, or a file path; YAML on stdout when omitted
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => {
            let config =
                Config::load_config(config, port).context("failed to load configuration")?;
            run(config).await
        }
        Commands::Spec { output } => generate_spec(output.as_deref()),
    }
}
