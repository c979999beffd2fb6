// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `keygate capabilities` - print what the gateway serves

use anyhow::{Context, Result};
use colored::Colorize;

use keygate_core::domain::capability::CapabilityKind;

use crate::demo::demo_registry;

pub fn run() -> Result<()> {
    let registry = demo_registry().context("Failed to register capabilities")?;

    for (kind, heading) in [
        (CapabilityKind::Tool, "Tools:"),
        (CapabilityKind::Resource, "Resources:"),
        (CapabilityKind::Prompt, "Prompts:"),
    ] {
        println!("{}", heading.bold());
        let mut empty = true;
        for descriptor in registry.list(kind) {
            empty = false;
            println!("  {} - {}", descriptor.name.bold(), descriptor.description);
        }
        if empty {
            println!("  {}", "(none)".dimmed());
        }
        println!();
    }

    Ok(())
}
