// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`keygate-core`)
//!
//! HTTP surface that translates SSE connections and posted JSON-RPC frames
//! into [`crate::application::SessionHub`] calls. No dispatch or
//! authorization logic lives here.

pub mod api;
