// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Credential Value Objects
//!
//! A [`Credential`] is the resolved identity behind a bearer token presented
//! at handshake time. It is created by a [`CredentialStore`] and lives exactly
//! as long as the session that presented it.
//!
//! The raw token is wrapped in [`BearerToken`], whose `Debug` and `Display`
//! output is redacted so that it can never end up in a log line by accident.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP authorization scheme accepted by the gateway.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Stable identifier of a configured credential (e.g. `"analytics-team"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CredentialId(pub String);

impl CredentialId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw bearer token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the secret bytes for comparison. Callers must not log the result.
    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

impl std::fmt::Display for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

/// Identity resolved from a presented token. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: CredentialId,
    token: BearerToken,
}

impl Credential {
    pub fn new(id: CredentialId, token: BearerToken) -> Self {
        Self { id, token }
    }

    pub fn token(&self) -> &BearerToken {
        &self.token
    }
}

/// Reasons a handshake can be refused before any session exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    /// No `Authorization` header was presented.
    #[error("missing bearer token")]
    Missing,
    /// A header was presented but does not follow the `Bearer <token>` scheme.
    #[error("malformed authorization header")]
    Malformed,
    /// Well-formed token that matches no configured credential.
    #[error("unknown bearer token")]
    Unknown,
}

impl AuthenticationError {
    /// Label used for metrics and audit records.
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Malformed => "malformed",
            Self::Unknown => "unknown",
        }
    }
}

/// Validates presented authorization headers against configured credentials.
///
/// Implementations must be pure lookups: no side effects, safe to call from
/// many sessions at once.
pub trait CredentialStore: Send + Sync {
    /// Resolve the value of an `Authorization` header into a [`Credential`].
    ///
    /// `None` means the header was absent.
    fn authenticate(&self, authorization: Option<&str>) -> Result<Credential, AuthenticationError>;
}

/// Split an `Authorization` header value into its bearer token.
pub fn parse_bearer(authorization: Option<&str>) -> Result<&str, AuthenticationError> {
    let header = authorization.ok_or(AuthenticationError::Missing)?;
    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthenticationError::Malformed)?;
    if token.is_empty() {
        return Err(AuthenticationError::Malformed);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bearer_classifies_headers() {
        assert_eq!(parse_bearer(None), Err(AuthenticationError::Missing));
        assert_eq!(parse_bearer(Some("Basic abc")), Err(AuthenticationError::Malformed));
        assert_eq!(parse_bearer(Some("Bearer ")), Err(AuthenticationError::Malformed));
        assert_eq!(parse_bearer(Some("bearer key1")), Err(AuthenticationError::Malformed));
        assert_eq!(parse_bearer(Some("Bearer key1")), Ok("key1"));
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let credential = Credential::new(CredentialId::new("ops"), BearerToken::new("super-secret"));
        let rendered = format!("{:?} {}", credential, credential.token());
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("ops"));
    }
}
