// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Demo capabilities served by `keygate serve`.
//!
//! Two arithmetic tools, a version resource, a templated greeting resource
//! and a summary prompt. They exist to exercise the dispatch path end to end.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};

use keygate_core::domain::capability::{CapabilityDescriptor, FnHandler};
use keygate_core::domain::uri_template::UriTemplate;
use keygate_core::infrastructure::registry::{CapabilityRegistry, CapabilityRegistryBuilder, RegistryError};

pub const VERSION_URI: &str = "config://version";
pub const GREETING_TEMPLATE: &str = "greeting://{name}";

fn operands_schema(first: &str, second: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": { "type": "number", "description": first },
            "b": { "type": "number", "description": second }
        },
        "required": ["a", "b"]
    })
}

fn operands(arguments: &Value) -> anyhow::Result<(f64, f64)> {
    let a = arguments["a"].as_f64().context("`a` must be a number")?;
    let b = arguments["b"].as_f64().context("`b` must be a number")?;
    Ok((a, b))
}

pub fn demo_registry() -> Result<Arc<CapabilityRegistry>, RegistryError> {
    let mut builder = CapabilityRegistryBuilder::new();

    builder.register(CapabilityDescriptor::tool(
        "add",
        "Add two numbers and return a + b.",
        operands_schema("First number", "Second number"),
        Arc::new(FnHandler::new(|arguments: Value| async move {
            let (a, b) = operands(&arguments)?;
            Ok::<_, anyhow::Error>(json!(a + b))
        })),
    ))?;

    builder.register(CapabilityDescriptor::tool(
        "subtract",
        "Subtract two numbers and return a - b.",
        operands_schema("The number to subtract from", "The number to subtract"),
        Arc::new(FnHandler::new(|arguments: Value| async move {
            let (a, b) = operands(&arguments)?;
            Ok::<_, anyhow::Error>(json!(a - b))
        })),
    ))?;

    builder.register(CapabilityDescriptor::resource(
        VERSION_URI,
        "Gateway version string.",
        Arc::new(FnHandler::new(|_arguments: Value| async move {
            Ok(json!(env!("CARGO_PKG_VERSION")))
        })),
    ))?;

    let greeting = UriTemplate::parse(GREETING_TEMPLATE)
        .map_err(|source| RegistryError::MalformedTemplate {
            name: GREETING_TEMPLATE.to_string(),
            source,
        })?;
    builder.register(CapabilityDescriptor::resource_template(
        GREETING_TEMPLATE,
        "Personalized greeting.",
        greeting.arguments_schema(),
        Arc::new(FnHandler::new(|arguments: Value| async move {
            let name = arguments["name"].as_str().context("`name` must be a string")?;
            Ok::<_, anyhow::Error>(json!(format!("Hello, {name}!")))
        })),
    ))?;

    builder.register(CapabilityDescriptor::prompt(
        "summarize_request",
        "Build a prompt asking for a summary of the given text.",
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to summarize" }
            },
            "required": ["text"]
        }),
        Arc::new(FnHandler::new(|arguments: Value| async move {
            let text = arguments["text"].as_str().context("`text` must be a string")?;
            Ok::<_, anyhow::Error>(json!(format!("Please summarize the following text:\n\n{text}")))
        })),
    ))?;

    Ok(builder.build())
}
