// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Registry
//!
//! Built once at startup through [`CapabilityRegistryBuilder`], then sealed
//! into an immutable [`CapabilityRegistry`] shared by every session behind an
//! `Arc`. Lookups never lock.
//!
//! Names are unique across all kinds so that a permission entry always refers
//! to exactly one capability.
//!
//! Resources registered under a URI template (`greeting://{name}`) are
//! reached through [`CapabilityRegistry::resolve`]: an exact name wins, then
//! templates are tried in registration order. The template string remains the
//! capability's name for permission checks.

use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::capability::{CapabilityDescriptor, CapabilityKind, CapabilitySummary};
use crate::domain::envelope::DispatchError;
use crate::domain::uri_template::{UriTemplate, UriTemplateError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("capability name cannot be empty")]
    EmptyName,

    #[error("capability already registered: {name} ({existing})")]
    DuplicateCapability { name: String, existing: CapabilityKind },

    #[error("input schema for {name} is not a valid JSON Schema: {reason}")]
    MalformedSchema { name: String, reason: String },

    #[error("resource template {name} is malformed: {source}")]
    MalformedTemplate {
        name: String,
        #[source]
        source: UriTemplateError,
    },
}

/// A descriptor together with its compiled argument validator.
pub struct RegisteredCapability {
    descriptor: CapabilityDescriptor,
    validator: jsonschema::Validator,
    template: Option<UriTemplate>,
}

/// A call target resolved to its registered capability.
pub struct Resolution<'a> {
    pub entry: &'a RegisteredCapability,
    /// Values extracted from a templated URI; empty for exact matches.
    pub variables: Map<String, Value>,
}

impl RegisteredCapability {
    pub fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    /// Check call arguments against the input schema.
    ///
    /// The declared `required` and `properties.*.type` constraints are checked
    /// first for short reasons; the compiled validator then catches everything
    /// else the schema expresses. Either way the error names the offending
    /// field, dotted for nested values (`filter.limit`, `items.0`).
    pub fn validate_arguments(&self, arguments: &Value) -> Result<(), DispatchError> {
        check_declared_fields(&self.descriptor.input_schema, arguments)?;

        self.validator
            .validate(arguments)
            .map_err(|e| DispatchError::InvalidArguments {
                field: offending_field(&e),
                reason: e.to_string(),
            })
    }
}

fn offending_field(error: &jsonschema::ValidationError<'_>) -> String {
    let mut path: Vec<String> = error
        .instance_path()
        .iter()
        .map(|segment| segment.to_string())
        .collect();

    // `required` fails at the parent object; point at the missing property.
    if let ValidationErrorKind::Required { property } = error.kind() {
        if let Some(name) = property.as_str() {
            path.push(name.to_string());
        }
    }

    if path.is_empty() {
        "arguments".to_string()
    } else {
        path.join(".")
    }
}

#[derive(Default)]
pub struct CapabilityRegistryBuilder {
    entries: Vec<RegisteredCapability>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: CapabilityDescriptor) -> Result<&mut Self, RegistryError> {
        if descriptor.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }

        if let Some(&existing) = self.index.get(&descriptor.name) {
            return Err(RegistryError::DuplicateCapability {
                name: descriptor.name,
                existing: self.entries[existing].descriptor.kind,
            });
        }

        let validator = jsonschema::validator_for(&descriptor.input_schema).map_err(|e| {
            RegistryError::MalformedSchema {
                name: descriptor.name.clone(),
                reason: e.to_string(),
            }
        })?;

        let template = if descriptor.is_template() {
            let parsed = UriTemplate::parse(&descriptor.name).map_err(|source| {
                RegistryError::MalformedTemplate {
                    name: descriptor.name.clone(),
                    source,
                }
            })?;
            Some(parsed)
        } else {
            None
        };

        tracing::debug!(
            capability = %descriptor.name,
            kind = %descriptor.kind,
            "Registered capability"
        );

        self.index.insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(RegisteredCapability {
            descriptor,
            validator,
            template,
        });
        Ok(self)
    }

    pub fn build(self) -> Arc<CapabilityRegistry> {
        Arc::new(CapabilityRegistry {
            entries: self.entries,
            index: self.index,
        })
    }
}

pub struct CapabilityRegistry {
    entries: Vec<RegisteredCapability>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn lookup(&self, name: &str) -> Option<&RegisteredCapability> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Find the capability of `kind` a call names.
    ///
    /// Only resources fall back to template matching.
    pub fn resolve(&self, kind: CapabilityKind, target: &str) -> Option<Resolution<'_>> {
        if let Some(entry) = self.lookup(target).filter(|entry| entry.descriptor.kind == kind) {
            return Some(Resolution {
                entry,
                variables: Map::new(),
            });
        }
        if kind != CapabilityKind::Resource {
            return None;
        }

        self.entries.iter().find_map(|entry| {
            let variables = entry.template.as_ref()?.match_uri(target)?;
            Some(Resolution { entry, variables })
        })
    }

    /// Registration order is preserved.
    pub fn list(&self, kind: CapabilityKind) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.entries
            .iter()
            .map(|entry| &entry.descriptor)
            .filter(move |descriptor| descriptor.kind == kind)
    }

    pub fn summaries(&self) -> Vec<CapabilitySummary> {
        self.entries.iter().map(|entry| entry.descriptor.summary()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn check_declared_fields(schema: &Value, arguments: &Value) -> Result<(), DispatchError> {
    let invalid = |field: &str, reason: String| DispatchError::InvalidArguments {
        field: field.to_string(),
        reason,
    };

    let expects_object = schema.get("type").and_then(Value::as_str) == Some("object");
    let Some(object) = arguments.as_object() else {
        if expects_object {
            return Err(invalid("arguments", "expected an object".to_string()));
        }
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(field) {
                return Err(invalid(field, "missing required field".to_string()));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, property) in properties {
            let (Some(value), Some(expected)) = (
                object.get(field),
                property.get("type").and_then(Value::as_str),
            ) else {
                continue;
            };
            if !json_type_matches(expected, value) {
                return Err(invalid(field, format!("expected {expected}")));
            }
        }
    }

    Ok(())
}

fn json_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}
