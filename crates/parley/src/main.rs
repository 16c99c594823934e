// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - an embedded chat widget session engine.
//!
//! This binary hosts the engine in a terminal: it plays the part of the
//! host page, so control messages can be injected and observed.

mod access;
mod chat;
mod engine;
mod jobs;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use parley_config::ParleyConfig;
use parley_core::ParleyError;

/// Parley - an embedded chat widget session engine.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override `logging.level`.
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive chat session.
    Chat,
    /// Check whether a customer's subscription grants access.
    Access {
        /// Customer to check. Defaults to the cached or configured customer.
        #[arg(long)]
        customer: Option<String>,
        /// Always ask the backend.
        #[arg(long)]
        no_cache: bool,
    },
    /// Report subscription backend health and public configuration.
    Health,
    /// Forget the cached customer and subscription status.
    ClearCache,
    /// Poll a background job until it finishes.
    Job {
        job_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    };
    let config = match config {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level);

    if let Err(e) = dispatch(cli.command, config).await {
        eprintln!("{}: {e}", "error".red());
        std::process::exit(1);
    }
}

async fn dispatch(command: Option<Commands>, config: ParleyConfig) -> Result<(), ParleyError> {
    match command {
        Some(Commands::Chat) => chat::run_chat(config).await,
        Some(Commands::Access { customer, no_cache }) => {
            access::run_access(&config, customer, no_cache).await
        }
        Some(Commands::Health) => access::run_health(&config).await,
        Some(Commands::ClearCache) => access::run_clear_cache(&config),
        Some(Commands::Job { job_id }) => jobs::run_job(&config, &job_id).await,
        None => {
            println!("parley: use --help for available commands");
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
