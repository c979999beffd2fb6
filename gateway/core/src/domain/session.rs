// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Session Aggregate
//!
//! Domain model for one long-lived client connection.
//!
//! ## Session Lifecycle
//!
//! ```text
//! Connecting ──handshake ok──▶ Active ──close──▶ Closing ──streams released──▶ Closed
//!      │                                                                         ▲
//!      └──────────────────────────handshake failed───────────────────────────────┘
//! ```
//!
//! Transitions are monotonic. Every method that changes state validates the
//! current state first and returns [`TransportError::InvalidTransition`] for
//! anything not drawn above.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::credential::CredentialId;

/// Opaque identifier for a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Why a session left the `Active` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// The client asked for the session to be closed.
    ClientRequested,
    /// The client dropped its event stream.
    ClientDisconnected,
    /// No inbound message and no in-flight call for the configured idle window.
    IdleTimeout,
    /// Writing to the outbound stream failed.
    StreamClosed,
    /// The client sent something that is not a valid protocol message.
    ProtocolViolation(String),
    ServerShutdown,
}

impl CloseReason {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::ClientRequested => "client_requested",
            Self::ClientDisconnected => "client_disconnected",
            Self::IdleTimeout => "idle_timeout",
            Self::StreamClosed => "stream_closed",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

/// Session-level failures. Any of these terminates the session it occurs on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("session stream is closed")]
    StreamClosed,
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("session not found")]
    SessionNotFound,
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    /// Set once the handshake succeeds.
    pub credential_id: Option<CredentialId>,
    pub state: SessionState,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
}

impl Session {
    /// A new session in `Connecting`, before any credential is checked.
    pub fn connecting() -> Self {
        Self {
            id: SessionId::new(),
            credential_id: None,
            state: SessionState::Connecting,
            opened_at: Utc::now(),
            closed_at: None,
            close_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// `Connecting → Active` once the credential has been authenticated.
    pub fn activate(&mut self, credential_id: CredentialId) -> Result<(), TransportError> {
        self.transition(SessionState::Connecting, SessionState::Active)?;
        self.credential_id = Some(credential_id);
        Ok(())
    }

    /// `Connecting → Closed` when the handshake is refused.
    pub fn reject(&mut self) -> Result<(), TransportError> {
        self.transition(SessionState::Connecting, SessionState::Closed)?;
        self.closed_at = Some(Utc::now());
        Ok(())
    }

    /// `Active → Closing`.
    pub fn begin_close(&mut self, reason: CloseReason) -> Result<(), TransportError> {
        self.transition(SessionState::Active, SessionState::Closing)?;
        self.close_reason = Some(reason);
        Ok(())
    }

    /// `Closing → Closed`, after both streams have been released.
    pub fn finish_close(&mut self) -> Result<(), TransportError> {
        self.transition(SessionState::Closing, SessionState::Closed)?;
        self.closed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, expected: SessionState, to: SessionState) -> Result<(), TransportError> {
        if self.state != expected {
            return Err(TransportError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}
