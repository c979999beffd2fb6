// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Permission Sets
//!
//! A [`PermissionSet`] is the list of capability names a credential may
//! invoke. Entries take three forms:
//!
//! - `"*"` matches every capability
//! - `"fs.*"` / `"config://*"` match any name starting with the text before `*`
//! - anything else is an exact match
//!
//! The set is read-only at request time. Decisions are returned as values
//! ([`AuthorizationDecision`]); a denial is never raised as a panic.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::credential::{Credential, CredentialId};

/// Capability names (or patterns) a single credential may invoke.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    entries: BTreeSet<String>,
}

impl PermissionSet {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// An empty set: every capability is denied.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn allows(&self, capability: &str) -> bool {
        self.entries.iter().any(|entry| Self::matches(entry, capability))
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matches(entry: &str, capability: &str) -> bool {
        if entry == "*" {
            return true;
        }
        if let Some(prefix) = entry.strip_suffix('*') {
            return capability.starts_with(prefix);
        }
        entry == capability
    }
}

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationDecision {
    Allowed,
    Denied,
}

impl AuthorizationDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Convert into a `Result` so callers can use `?`.
    pub fn into_result(self) -> Result<(), AuthorizationError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied => Err(AuthorizationError::Denied),
        }
    }
}

/// Call-level authorization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("permission denied")]
    Denied,
}

/// Maps credential identities to permission sets and decides allow/deny.
pub trait PermissionPolicy: Send + Sync {
    /// Decide whether `credential` may invoke `capability`.
    ///
    /// Must be deterministic and must return `Denied` for unknown credentials
    /// and for capability names that are not registered at all.
    fn authorize(&self, credential: &Credential, capability: &str) -> AuthorizationDecision;

    /// The full permission set configured for `credential`.
    fn permissions_for(&self, credential: &CredentialId) -> PermissionSet;
}
