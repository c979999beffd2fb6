// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Protocol-neutral messages exchanged with a session worker.
//!
//! The wire codec turns client frames into [`InboundMessage`]s and turns
//! [`SessionReply`]s back into frames. The worker itself never sees JSON-RPC.

use super::capability::CapabilityKind;
use super::envelope::{CallEnvelope, CorrelationId, DispatchError, ResultEnvelope};

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Invoke a capability.
    Call(CallEnvelope),
    /// Session-level request answered by the gateway itself.
    Control {
        correlation_id: CorrelationId,
        request: ControlRequest,
    },
    /// Fire-and-forget; no reply is produced.
    Notification { method: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    Initialize,
    Ping,
    List(CapabilityKind),
    ListResourceTemplates,
    /// Well-formed frame the gateway cannot serve; answered with this error.
    Reject(DispatchError),
}

/// What produced a reply, so the codec can shape the success payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOrigin {
    Call { kind: CapabilityKind, capability: String },
    Initialize,
    Ping,
    List(CapabilityKind),
    ListResourceTemplates,
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReply {
    pub origin: ReplyOrigin,
    pub envelope: ResultEnvelope,
}

impl SessionReply {
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.envelope.correlation_id
    }
}
