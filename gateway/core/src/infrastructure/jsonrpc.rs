// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # JSON-RPC 2.0 / MCP Wire Codec
//!
//! Translates between MCP JSON-RPC frames and the protocol-neutral
//! [`InboundMessage`] / [`SessionReply`] types.
//!
//! A frame that is not JSON-RPC at all is a [`TransportError::ProtocolViolation`]
//! and terminates the session. A well-formed frame naming an unknown method
//! or carrying bad params is answered with an error result instead.
//!
//! ## Error codes
//!
//! | error | code |
//! |-------|------|
//! | `HandlerFailure` | -32000 |
//! | `CapabilityNotFound` | -32001 |
//! | `PermissionDenied` | -32003 |
//! | `UnsupportedMethod` | -32601 |
//! | `InvalidArguments` | -32602 |

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::domain::capability::{CapabilityKind, CapabilitySummary};
use crate::domain::envelope::{CallEnvelope, CorrelationId, DispatchError, Outcome};
use crate::domain::message::{ControlRequest, InboundMessage, ReplyOrigin, SessionReply};
use crate::domain::session::TransportError;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
struct Frame {
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

pub fn decode(body: &[u8]) -> Result<InboundMessage, TransportError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| TransportError::ProtocolViolation(format!("invalid JSON: {e}")))?;

    if value.is_array() {
        return Err(TransportError::ProtocolViolation(
            "batch requests are not supported".to_string(),
        ));
    }

    let frame: Frame = serde_json::from_value(value)
        .map_err(|e| TransportError::ProtocolViolation(format!("not a JSON-RPC frame: {e}")))?;

    if frame.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
        return Err(TransportError::ProtocolViolation(
            "jsonrpc must be \"2.0\"".to_string(),
        ));
    }

    let method = frame
        .method
        .ok_or_else(|| TransportError::ProtocolViolation("missing method".to_string()))?;

    let Some(raw_id) = frame.id else {
        return Ok(InboundMessage::Notification { method });
    };
    let correlation_id: CorrelationId = serde_json::from_value(raw_id).map_err(|_| {
        TransportError::ProtocolViolation("id must be a string or an integer".to_string())
    })?;

    let params = frame.params.unwrap_or_else(|| Value::Object(Map::new()));
    Ok(route(correlation_id, &method, params))
}

fn route(correlation_id: CorrelationId, method: &str, params: Value) -> InboundMessage {
    let control = |request| InboundMessage::Control {
        correlation_id: correlation_id.clone(),
        request,
    };

    let call = |kind: CapabilityKind, name_field: &str| {
        let Some(name) = params.get(name_field).and_then(Value::as_str) else {
            return control(ControlRequest::Reject(DispatchError::InvalidArguments {
                field: name_field.to_string(),
                reason: "expected a string".to_string(),
            }));
        };
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(arguments) => arguments.clone(),
        };
        InboundMessage::Call(CallEnvelope::new(correlation_id.clone(), kind, name, arguments))
    };

    match method {
        "initialize" => control(ControlRequest::Initialize),
        "ping" => control(ControlRequest::Ping),
        "tools/list" => control(ControlRequest::List(CapabilityKind::Tool)),
        "resources/list" => control(ControlRequest::List(CapabilityKind::Resource)),
        "resources/templates/list" => control(ControlRequest::ListResourceTemplates),
        "prompts/list" => control(ControlRequest::List(CapabilityKind::Prompt)),
        "tools/call" => call(CapabilityKind::Tool, "name"),
        "resources/read" => call(CapabilityKind::Resource, "uri"),
        "prompts/get" => call(CapabilityKind::Prompt, "name"),
        other => control(ControlRequest::Reject(DispatchError::UnsupportedMethod {
            method: other.to_string(),
        })),
    }
}

/// Encode a reply as a JSON-RPC response object.
pub fn encode(reply: &SessionReply) -> Value {
    let id = &reply.envelope.correlation_id;
    match &reply.envelope.outcome {
        Outcome::Success(value) => json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "result": shape_success(&reply.origin, value),
        }),
        Outcome::Error(error) => json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "error": encode_error(error),
        }),
    }
}

pub fn error_code(error: &DispatchError) -> i64 {
    match error {
        DispatchError::HandlerFailure { .. } => -32000,
        DispatchError::CapabilityNotFound { .. } => -32001,
        DispatchError::PermissionDenied { .. } => -32003,
        DispatchError::UnsupportedMethod { .. } => -32601,
        DispatchError::InvalidArguments { .. } => -32602,
    }
}

fn encode_error(error: &DispatchError) -> Value {
    let mut data = json!({ "kind": error.kind_label() });
    if let DispatchError::InvalidArguments { field, .. } = error {
        data["field"] = json!(field);
    }
    json!({
        "code": error_code(error),
        "message": error.to_string(),
        "data": data,
    })
}

fn shape_success(origin: &ReplyOrigin, value: &Value) -> Value {
    match origin {
        ReplyOrigin::Call { kind: CapabilityKind::Tool, .. } => {
            let structured = if value.is_object() {
                value.clone()
            } else {
                json!({ "result": value })
            };
            json!({
                "content": [{ "type": "text", "text": text_of(value) }],
                "structuredContent": structured,
                "isError": false,
            })
        }
        ReplyOrigin::Call { kind: CapabilityKind::Resource, capability } => json!({
            "contents": [{ "uri": capability, "mimeType": "text/plain", "text": text_of(value) }],
        }),
        ReplyOrigin::Call { kind: CapabilityKind::Prompt, .. } => {
            if value.get("messages").is_some() {
                return value.clone();
            }
            json!({
                "messages": [{
                    "role": "user",
                    "content": { "type": "text", "text": text_of(value) },
                }],
            })
        }
        ReplyOrigin::Initialize => json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false },
                "prompts": { "listChanged": false },
            },
            "serverInfo": value,
        }),
        ReplyOrigin::List(kind) => {
            let summaries: Vec<CapabilitySummary> =
                serde_json::from_value(value.clone()).unwrap_or_default();
            shape_listing(*kind, &summaries)
        }
        ReplyOrigin::ListResourceTemplates => {
            let summaries: Vec<CapabilitySummary> =
                serde_json::from_value(value.clone()).unwrap_or_default();
            json!({
                "resourceTemplates": summaries.iter().map(|s| json!({
                    "uriTemplate": s.name,
                    "name": s.name,
                    "description": s.description,
                    "mimeType": "text/plain",
                })).collect::<Vec<_>>(),
            })
        }
        ReplyOrigin::Ping | ReplyOrigin::Rejected => value.clone(),
    }
}

fn shape_listing(kind: CapabilityKind, summaries: &[CapabilitySummary]) -> Value {
    match kind {
        CapabilityKind::Tool => json!({
            "tools": summaries.iter().map(|s| json!({
                "name": s.name,
                "description": s.description,
                "inputSchema": s.input_schema,
            })).collect::<Vec<_>>(),
        }),
        CapabilityKind::Resource => json!({
            "resources": summaries.iter().map(|s| json!({
                "uri": s.name,
                "name": s.name,
                "description": s.description,
                "mimeType": "text/plain",
            })).collect::<Vec<_>>(),
        }),
        CapabilityKind::Prompt => json!({
            "prompts": summaries.iter().map(|s| json!({
                "name": s.name,
                "description": s.description,
                "arguments": prompt_arguments(&s.input_schema),
            })).collect::<Vec<_>>(),
        }),
    }
}

fn prompt_arguments(schema: &Value) -> Vec<Value> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| fields.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| {
            properties
                .iter()
                .map(|(name, property)| {
                    let mut argument = json!({
                        "name": name,
                        "required": required.contains(&name.as_str()),
                    });
                    if let Some(description) = property.get("description") {
                        argument["description"] = description.clone();
                    }
                    argument
                })
                .collect()
        })
        .unwrap_or_default()
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
