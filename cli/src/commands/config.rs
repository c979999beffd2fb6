// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use keygate_core::domain::gateway_config::GatewayConfigManifest;

/// Sample manifest written by `keygate config generate`.
pub const SAMPLE_CONFIG: &str = include_str!("../../templates/keygate-config.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./keygate-config.yaml)
        #[arg(short, long, default_value = "./keygate-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. KEYGATE_CONFIG_PATH: {}",
            std::env::var("KEYGATE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./keygate-config.yaml");
        println!("  4. ~/.keygate/config.yaml");
        println!("  5. /etc/keygate/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    let spec = &config.spec;

    println!("{}", "Gateway:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Listen: {}:{}", spec.server.bind_address, spec.server.port);
    println!("  SSE path: {}", spec.http.sse_path);
    println!("  Messages path: {}", spec.http.messages_path);
    println!();

    // Tokens are never printed.
    println!("{}", "Credentials:".bold());
    if spec.credentials.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for credential in &spec.credentials {
        println!("  {} → {}", credential.id.bold(), credential.permissions.join(", "));
    }
    println!();

    println!("{}", "Policy:".bold());
    println!("  Dispatch order: {:?}", spec.policy.dispatch_order);
    println!("  Listing: {:?}", spec.policy.listing);
    println!();

    println!("{}", "Sessions:".bold());
    println!("  Inbound buffer: {}", spec.session.inbound_buffer);
    println!("  Outbound buffer: {}", spec.session.outbound_buffer);
    println!("  Max in-flight calls: {}", spec.session.max_in_flight);
    if spec.session.idle_timeout_secs == 0 {
        println!("  Idle timeout: {}", "disabled".dimmed());
    } else {
        println!("  Idle timeout: {}s", spec.session.idle_timeout_secs);
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    std::fs::write(&output, SAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
