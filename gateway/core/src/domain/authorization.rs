// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Authorization Context
//!
//! The per-session replacement for a process-wide "current token" variable.
//!
//! ## Invariants
//!
//! - Exactly one `AuthorizationContext` exists per active session. It is
//!   constructed during the handshake and owned by that session's worker task.
//! - It is never stored in any structure reachable by another session; the
//!   shared session repository only keeps the credential *id*.
//! - It is immutable and is dropped when the session closes; it is never
//!   reused for a later session.
//!
//! The type is deliberately not `Clone`. Concurrent calls on the same session
//! share it through the worker's `Arc`.

use super::credential::Credential;
use super::permission::PermissionSet;
use super::session::SessionId;

#[derive(Debug)]
pub struct AuthorizationContext {
    session_id: SessionId,
    credential: Credential,
    permissions: PermissionSet,
}

impl AuthorizationContext {
    pub fn new(session_id: SessionId, credential: Credential, permissions: PermissionSet) -> Self {
        Self {
            session_id,
            credential,
            permissions,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    /// Whether the bound permission set covers `capability`. Used for listing
    /// filters; invocation decisions go through the `PermissionPolicy`.
    pub fn may_invoke(&self, capability: &str) -> bool {
        self.permissions.allows(capability)
    }
}
