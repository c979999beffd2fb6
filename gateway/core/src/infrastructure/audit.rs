// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Gateway Audit Logger
//!
//! Emits structured audit records for handshakes, dispatched calls and
//! session teardown, and keeps the matching `metrics` counters current.
//!
//! Records identify callers by credential id only. Raw bearer tokens never
//! reach this module.
//!
//! ## Metrics
//!
//! | name | type | labels |
//! |------|------|--------|
//! | `keygate_handshakes_total` | counter | `outcome` |
//! | `keygate_calls_total` | counter | `outcome` |
//! | `keygate_sessions_closed_total` | counter | `reason` |
//! | `keygate_active_sessions` | gauge | |

use std::time::Duration;

use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::domain::capability::CapabilityKind;
use crate::domain::credential::{AuthenticationError, CredentialId};
use crate::domain::envelope::{DispatchError, ResultEnvelope};
use crate::domain::session::{CloseReason, SessionId};

pub const HANDSHAKES_TOTAL: &str = "keygate_handshakes_total";
pub const CALLS_TOTAL: &str = "keygate_calls_total";
pub const SESSIONS_CLOSED_TOTAL: &str = "keygate_sessions_closed_total";
pub const ACTIVE_SESSIONS: &str = "keygate_active_sessions";

/// Stateless; cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct AuditLogger {}

impl AuditLogger {
    pub fn new() -> Self {
        Self {}
    }

    pub fn handshake_accepted(&self, session_id: SessionId, credential_id: &CredentialId, active: usize) {
        info!(%session_id, %credential_id, "Session opened");
        counter!(HANDSHAKES_TOTAL, "outcome" => "accepted").increment(1);
        gauge!(ACTIVE_SESSIONS).set(active as f64);
    }

    pub fn handshake_rejected(&self, error: AuthenticationError) {
        warn!(reason = error.as_label(), "Handshake rejected: {}", error);
        counter!(HANDSHAKES_TOTAL, "outcome" => error.as_label()).increment(1);
    }

    /// Record one finished call. Denials are logged at `WARN`.
    pub fn call_completed(
        &self,
        session_id: SessionId,
        credential_id: &CredentialId,
        kind: CapabilityKind,
        capability: &str,
        result: &ResultEnvelope,
        elapsed: Duration,
    ) {
        let outcome = result.outcome_label();
        match result.error_kind() {
            Some(DispatchError::PermissionDenied { .. }) => {
                warn!(
                    %session_id,
                    %credential_id,
                    %kind,
                    capability,
                    "Call denied by permission policy"
                );
            }
            Some(DispatchError::HandlerFailure { message }) => {
                warn!(
                    %session_id,
                    %credential_id,
                    capability,
                    error = %message,
                    "Capability handler failed"
                );
            }
            _ => {
                debug!(
                    %session_id,
                    %credential_id,
                    %kind,
                    capability,
                    correlation_id = %result.correlation_id,
                    outcome,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Call completed"
                );
            }
        }
        counter!(CALLS_TOTAL, "outcome" => outcome).increment(1);
    }

    /// A result that was ready after the session closed and was dropped.
    pub fn result_discarded(&self, session_id: SessionId, capability: &str) {
        debug!(%session_id, capability, "Session closed before result delivery; result discarded");
        counter!(CALLS_TOTAL, "outcome" => "discarded").increment(1);
    }

    pub fn session_closed(&self, session_id: SessionId, reason: &CloseReason, active: usize) {
        match reason {
            CloseReason::ProtocolViolation(detail) => {
                warn!(%session_id, reason = reason.as_label(), detail = %detail, "Session closed");
            }
            _ => info!(%session_id, reason = reason.as_label(), "Session closed"),
        }
        counter!(SESSIONS_CLOSED_TOTAL, "reason" => reason.as_label()).increment(1);
        gauge!(ACTIVE_SESSIONS).set(active as f64);
    }
}
