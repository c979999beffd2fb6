// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod dispatcher;
pub mod session_service;

pub use dispatcher::Dispatcher;
pub use session_service::{HandshakeError, HubSettings, OpenedSession, SessionGuard, SessionHub};
