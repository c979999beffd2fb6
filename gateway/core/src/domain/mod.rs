// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: credentials, permissions, capabilities, sessions, the
//! envelopes that flow between them, and the gateway configuration manifest.

pub mod authorization;
pub mod capability;
pub mod credential;
pub mod envelope;
pub mod gateway_config;
pub mod message;
pub mod permission;
pub mod session;
pub mod uri_template;

pub use authorization::AuthorizationContext;
pub use capability::{CapabilityDescriptor, CapabilityHandler, CapabilityKind, CapabilitySummary, FnHandler};
pub use credential::{AuthenticationError, BearerToken, Credential, CredentialId, CredentialStore};
pub use envelope::{CallEnvelope, CorrelationId, DispatchError, Outcome, ResultEnvelope};
pub use gateway_config::{DispatchOrder, GatewayConfigManifest, ListingPolicy};
pub use message::{ControlRequest, InboundMessage, ReplyOrigin, SessionReply};
pub use permission::{AuthorizationDecision, AuthorizationError, PermissionPolicy, PermissionSet};
pub use session::{CloseReason, Session, SessionId, SessionState, TransportError};
pub use uri_template::{UriTemplate, UriTemplateError};
