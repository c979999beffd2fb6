// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod audit;
pub mod credential_store;
pub mod jsonrpc;
pub mod permission_policy;
pub mod registry;
pub mod session_repository;

pub use audit::AuditLogger;
pub use credential_store::StaticCredentialStore;
pub use permission_policy::StaticPermissionPolicy;
pub use registry::{CapabilityRegistry, CapabilityRegistryBuilder, RegistryError};
pub use session_repository::{InMemorySessionRepository, SessionHandle};
