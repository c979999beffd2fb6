// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Call and Result Envelopes
//!
//! One [`CallEnvelope`] is one unit of work submitted on a session. Every
//! call accepted into an `Active` session yields exactly one
//! [`ResultEnvelope`] carrying the same [`CorrelationId`], unless the session
//! closes first, in which case the result is discarded.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::capability::CapabilityKind;

/// Client-supplied identifier linking a call to its result (the JSON-RPC `id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrelationId {
    Number(i64),
    String(String),
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for CorrelationId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallEnvelope {
    pub correlation_id: CorrelationId,
    pub kind: CapabilityKind,
    pub capability: String,
    pub arguments: Value,
}

impl CallEnvelope {
    pub fn new(
        correlation_id: impl Into<CorrelationId>,
        kind: CapabilityKind,
        capability: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            kind,
            capability: capability.into(),
            arguments,
        }
    }

    /// Shorthand for a tool call, the common case.
    pub fn tool(correlation_id: impl Into<CorrelationId>, capability: impl Into<String>, arguments: Value) -> Self {
        Self::new(correlation_id, CapabilityKind::Tool, capability, arguments)
    }
}

/// Per-call failures. None of these terminate the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("{kind} not found: {name}")]
    CapabilityNotFound { kind: CapabilityKind, name: String },

    #[error("invalid argument `{field}`: {reason}")]
    InvalidArguments { field: String, reason: String },

    #[error("permission denied for {name}")]
    PermissionDenied { name: String },

    #[error("handler failed: {message}")]
    HandlerFailure { message: String },

    /// The message named a protocol method the gateway does not serve.
    #[error("method not supported: {method}")]
    UnsupportedMethod { method: String },
}

impl DispatchError {
    /// Stable snake_case label, used on the wire and in metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::CapabilityNotFound { .. } => "capability_not_found",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::HandlerFailure { .. } => "handler_failure",
            Self::UnsupportedMethod { .. } => "unsupported_method",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Error(DispatchError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultEnvelope {
    pub correlation_id: CorrelationId,
    pub outcome: Outcome,
}

impl ResultEnvelope {
    pub fn success(correlation_id: CorrelationId, value: Value) -> Self {
        Self {
            correlation_id,
            outcome: Outcome::Success(value),
        }
    }

    pub fn error(correlation_id: CorrelationId, error: DispatchError) -> Self {
        Self {
            correlation_id,
            outcome: Outcome::Error(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn error_kind(&self) -> Option<&DispatchError> {
        match &self.outcome {
            Outcome::Error(e) => Some(e),
            Outcome::Success(_) => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success(v) => Some(v),
            Outcome::Error(_) => None,
        }
    }

    /// Label for metrics and audit: `"success"` or the error kind.
    pub fn outcome_label(&self) -> &'static str {
        match &self.outcome {
            Outcome::Success(_) => "success",
            Outcome::Error(e) => e.kind_label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn correlation_ids_accept_numbers_and_strings() {
        let n: CorrelationId = serde_json::from_value(json!(7)).unwrap();
        let s: CorrelationId = serde_json::from_value(json!("req-7")).unwrap();
        assert_eq!(n, CorrelationId::Number(7));
        assert_eq!(s, CorrelationId::String("req-7".to_string()));
        assert_eq!(serde_json::to_value(&s).unwrap(), json!("req-7"));
    }

    #[test]
    fn error_labels_are_distinct() {
        let not_found = DispatchError::CapabilityNotFound {
            kind: CapabilityKind::Tool,
            name: "multiply".into(),
        };
        let denied = DispatchError::PermissionDenied { name: "subtract".into() };
        assert_ne!(not_found.kind_label(), denied.kind_label());
        assert_eq!(not_found.to_string(), "tool not found: multiply");
    }
}
