// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Descriptors
//!
//! A capability is a named operation the gateway exposes for remote
//! invocation. Descriptors are built once at startup and handed to the
//! [`crate::infrastructure::registry::CapabilityRegistryBuilder`]; after the
//! registry is sealed they are never mutated.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::authorization::AuthorizationContext;
use super::uri_template::UriTemplate;

/// The three MCP capability families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 3] = [Self::Tool, Self::Resource, Self::Prompt];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Resource => "resource",
            Self::Prompt => "prompt",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business logic behind a capability.
///
/// Handlers may be slow and may fail. A returned error only fails the call
/// that triggered it; the owning session keeps serving. Handlers receive the
/// caller's [`AuthorizationContext`] read-only.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn invoke(&self, arguments: Value, context: &AuthorizationContext) -> anyhow::Result<Value>;
}

/// Adapter turning an async closure over the arguments into a handler.
pub struct FnHandler<F>(F);

impl<F, Fut> FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> CapabilityHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn invoke(&self, arguments: Value, _context: &AuthorizationContext) -> anyhow::Result<Value> {
        (self.0)(arguments).await
    }
}

/// Immutable description of one registered capability.
#[derive(Clone)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub kind: CapabilityKind,
    pub description: String,
    /// JSON Schema the call arguments must satisfy.
    pub input_schema: Value,
    pub handler: Arc<dyn CapabilityHandler>,
}

impl CapabilityDescriptor {
    pub fn new(
        kind: CapabilityKind,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            input_schema,
            handler,
        }
    }

    pub fn tool(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self::new(CapabilityKind::Tool, name, description, input_schema, handler)
    }

    /// Resources are addressed by URI and take no arguments.
    pub fn resource(
        uri: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self::new(
            CapabilityKind::Resource,
            uri,
            description,
            serde_json::json!({ "type": "object" }),
            handler,
        )
    }

    /// A resource family addressed by a URI template such as
    /// `greeting://{name}`. Template variables arrive as string arguments and
    /// are validated against `input_schema`; see
    /// [`UriTemplate::arguments_schema`] for the minimal one.
    pub fn resource_template(
        uri_template: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self::new(CapabilityKind::Resource, uri_template, description, input_schema, handler)
    }

    pub fn prompt(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self::new(CapabilityKind::Prompt, name, description, input_schema, handler)
    }

    pub fn is_template(&self) -> bool {
        self.kind == CapabilityKind::Resource && UriTemplate::is_template(&self.name)
    }

    pub fn summary(&self) -> CapabilitySummary {
        CapabilitySummary {
            name: self.name.clone(),
            kind: self.kind,
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

/// Listing view of a descriptor (no handler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySummary {
    pub name: String,
    pub kind: CapabilityKind,
    pub description: String,
    pub input_schema: Value,
}
