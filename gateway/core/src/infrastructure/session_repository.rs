// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::credential::CredentialId;
use crate::domain::message::InboundMessage;
use crate::domain::session::{CloseReason, Session, SessionId, SessionState, TransportError};

/// Shared view of one live session.
///
/// This is everything other tasks may see: the session record, the inbound
/// queue sender and the cancellation token. The session's
/// `AuthorizationContext` is owned by its worker and never stored here.
pub struct SessionHandle {
    id: SessionId,
    credential_id: CredentialId,
    session: Mutex<Session>,
    inbound: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl SessionHandle {
    /// `session` must already be `Active`.
    pub fn new(session: Session, credential_id: CredentialId, inbound: mpsc::Sender<InboundMessage>, cancel: CancellationToken) -> Self {
        Self {
            id: session.id,
            credential_id,
            session: Mutex::new(session),
            inbound,
            cancel,
            done: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn credential_id(&self) -> &CredentialId {
        &self.credential_id
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.session.lock().is_active()
    }

    pub fn snapshot(&self) -> Session {
        self.session.lock().clone()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Enqueue a message, waiting while the queue is full. Gives up with
    /// `StreamClosed` as soon as the session is cancelled.
    pub async fn enqueue(&self, message: InboundMessage) -> Result<(), TransportError> {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(TransportError::StreamClosed),

            sent = self.inbound.send(message) => sent.map_err(|_| TransportError::StreamClosed),
        }
    }

    /// Move `Active → Closing` with `reason` and wake the worker. Returns
    /// `false` if the session was already closing, leaving the first reason
    /// in place.
    pub fn request_close(&self, reason: CloseReason) -> bool {
        let moved = self.session.lock().begin_close(reason).is_ok();
        if moved {
            self.cancel.cancel();
        }
        moved
    }

    /// Called by the worker once its loop has stopped. If nobody recorded a
    /// reason (the client simply went away), `fallback` is used.
    pub fn settle_close_reason(&self, fallback: CloseReason) -> CloseReason {
        let mut session = self.session.lock();
        if session.is_active() {
            let _ = session.begin_close(fallback.clone());
        }
        session.close_reason.clone().unwrap_or(fallback)
    }

    pub fn finish_close(&self) -> Result<(), TransportError> {
        let result = self.session.lock().finish_close();
        self.done.cancel();
        result
    }

    /// Resolves once the worker has released everything.
    pub async fn closed(&self) {
        self.done.cancelled().await
    }
}

/// Live sessions, keyed by id. Entries are removed when their worker exits.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: Arc<SessionHandle>) {
        self.sessions.insert(handle.id(), handle);
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.remove(id).map(|(_, handle)| handle)
    }

    pub fn all(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
