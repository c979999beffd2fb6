// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `keygate serve`

use anyhow::{Context, Result};
use std::path::PathBuf;

use keygate_core::domain::gateway_config::GatewayConfigManifest;

use crate::demo::demo_registry;
use crate::server;

pub async fn run(config_path: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut manifest = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    // Flags win over file and environment.
    if let Some(host) = host {
        manifest.spec.server.bind_address = host;
    }
    if let Some(port) = port {
        manifest.spec.server.port = port;
    }

    let registry = demo_registry().context("Failed to register capabilities")?;
    server::serve(manifest, registry).await
}
