// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Keygate CLI
//!
//! The `keygate` binary runs the gateway and manages its configuration.
//!
//! ## Commands
//!
//! - `keygate serve` - Run the MCP gateway over HTTP/SSE
//! - `keygate capabilities` - List the capabilities the gateway serves
//! - `keygate config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use keygate::commands::{self, ConfigCommand};
use keygate_core::domain::gateway_config::GatewayConfigManifest;

/// Keygate - authorization-gated MCP gateway
#[derive(Parser)]
#[command(name = "keygate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "KEYGATE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level.
    #[arg(long, global = true, env = "KEYGATE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    #[command(name = "serve")]
    Serve {
        /// Bind address (overrides configuration)
        #[arg(long)]
        host: Option<String>,

        /// HTTP port (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },

    /// List served capabilities
    #[command(name = "capabilities")]
    Capabilities,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config commands report load failures themselves, so a broken file must
    // not stop logging from coming up.
    let observability = GatewayConfigManifest::load_or_default(cli.config.clone())
        .map(|manifest| manifest.spec.observability)
        .unwrap_or_default();
    let level = cli.log_level.as_deref().unwrap_or(&observability.log_level);
    init_logging(level, &observability.log_format)?;

    match cli.command {
        Some(Commands::Serve { host, port }) => commands::serve::run(cli.config, host, port).await,
        Some(Commands::Capabilities) => commands::capabilities::run(),
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
