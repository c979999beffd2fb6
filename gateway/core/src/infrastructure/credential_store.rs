// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashSet;

use subtle::ConstantTimeEq;

use crate::domain::credential::{
    parse_bearer, AuthenticationError, BearerToken, Credential, CredentialId, CredentialStore,
};
use crate::domain::gateway_config::CredentialConfig;

/// Credential table loaded from configuration at startup.
///
/// Token comparison runs in constant time and always scans the whole table,
/// so response timing does not reveal how close a guess was.
pub struct StaticCredentialStore {
    credentials: Vec<Credential>,
}

impl StaticCredentialStore {
    pub fn new(credentials: impl IntoIterator<Item = Credential>) -> Self {
        Self {
            credentials: credentials.into_iter().collect(),
        }
    }

    /// Build the table from config entries, resolving `env:VAR` tokens.
    ///
    /// Fails if two entries resolve to the same token: a presented token must
    /// identify exactly one credential.
    pub fn from_config(entries: &[CredentialConfig]) -> anyhow::Result<Self> {
        let mut seen = HashSet::new();
        let mut credentials = Vec::with_capacity(entries.len());
        for entry in entries {
            let token = entry.resolve_token()?;
            if !seen.insert(token.clone()) {
                anyhow::bail!(
                    "Credential '{}' resolves to a token already assigned to another credential",
                    entry.id
                );
            }
            credentials.push(Credential::new(CredentialId::new(&entry.id), BearerToken::new(token)));
        }
        Ok(Self { credentials })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

impl CredentialStore for StaticCredentialStore {
    fn authenticate(&self, authorization: Option<&str>) -> Result<Credential, AuthenticationError> {
        let presented = parse_bearer(authorization)?.as_bytes();

        // Tokens are unique (`from_config` rejects duplicates), so at most one
        // entry can match. The scan still visits every entry.
        let mut matched: Option<&Credential> = None;
        for credential in &self.credentials {
            let equal: bool = credential.token().expose().ct_eq(presented).into();
            if equal {
                debug_assert!(matched.is_none(), "two credentials share a token");
                matched = Some(credential);
            }
        }

        matched.cloned().ok_or(AuthenticationError::Unknown)
    }
}
