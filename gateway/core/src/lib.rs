// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Keygate core
//!
//! Authorization-gated capability dispatch for an MCP server with an SSE
//! session transport.
//!
//! # Architecture
//!
//! - **domain:** credentials, permissions, capabilities, sessions, envelopes
//! - **application:** [`application::Dispatcher`] and [`application::SessionHub`]
//! - **infrastructure:** static credential and permission tables, the
//!   capability registry, the session repository, audit and the JSON-RPC codec
//! - **presentation:** the axum SSE transport

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
