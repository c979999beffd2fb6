// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use crate::domain::credential::{Credential, CredentialId};
use crate::domain::gateway_config::CredentialConfig;
use crate::domain::permission::{AuthorizationDecision, PermissionPolicy, PermissionSet};

/// Permission table keyed by credential id. Read-only after construction and
/// shared across sessions without locking.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissionPolicy {
    table: HashMap<CredentialId, PermissionSet>,
}

impl StaticPermissionPolicy {
    pub fn new(table: HashMap<CredentialId, PermissionSet>) -> Self {
        Self { table }
    }

    pub fn from_config(entries: &[CredentialConfig]) -> Self {
        let table = entries
            .iter()
            .map(|entry| {
                (
                    CredentialId::new(&entry.id),
                    PermissionSet::new(entry.permissions.iter().cloned()),
                )
            })
            .collect();
        Self { table }
    }
}

impl PermissionPolicy for StaticPermissionPolicy {
    fn authorize(&self, credential: &Credential, capability: &str) -> AuthorizationDecision {
        match self.table.get(&credential.id) {
            Some(set) if set.allows(capability) => AuthorizationDecision::Allowed,
            _ => AuthorizationDecision::Denied,
        }
    }

    fn permissions_for(&self, credential: &CredentialId) -> PermissionSet {
        self.table.get(credential).cloned().unwrap_or_default()
    }
}
