// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Session Hub
//!
//! Owns the lifecycle of every client session: handshake, inbound submission,
//! concurrent dispatch and teardown.
//!
//! ## Task layout
//!
//! Each session gets one worker task. The worker owns the session's
//! [`AuthorizationContext`] (behind an `Arc` shared only with the call tasks
//! it spawns), the receiving end of the bounded inbound queue and a
//! [`JoinSet`] of in-flight calls. Calls on one session run concurrently and
//! complete in any order; each result is tagged with its correlation id.
//!
//! ## Backpressure
//!
//! At most `max_in_flight` calls run per session, and a call stays in flight
//! until its reply is in the bounded outbound queue. When the reader stalls,
//! the worker stops taking inbound messages, the inbound queue fills and
//! [`SessionHub::submit`] waits. Nothing is buffered beyond the two queues
//! and the in-flight limit.
//!
//! ## Shutdown
//!
//! Closing a session cancels its token. The worker stops reading, aborts the
//! in-flight calls, drops both queues and only then removes the session from
//! the repository and marks it `Closed`. A result that becomes ready
//! after cancellation is discarded, never delivered; so is one still waiting
//! in the outbound queue, because the client end stops reading as soon as
//! the token fires.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use super::dispatcher::Dispatcher;
use crate::domain::authorization::AuthorizationContext;
use crate::domain::credential::{AuthenticationError, Credential, CredentialId, CredentialStore};
use crate::domain::envelope::{CallEnvelope, CorrelationId, ResultEnvelope};
use crate::domain::gateway_config::SessionConfig;
use crate::domain::message::{ControlRequest, InboundMessage, ReplyOrigin, SessionReply};
use crate::domain::permission::PermissionPolicy;
use crate::domain::session::{CloseReason, Session, SessionId, TransportError};
use crate::infrastructure::audit::AuditLogger;
use crate::infrastructure::session_repository::{InMemorySessionRepository, SessionHandle};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error("gateway is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone)]
pub struct HubSettings {
    pub inbound_buffer: usize,
    pub outbound_buffer: usize,
    pub max_in_flight: usize,
    pub idle_timeout: Option<Duration>,
    /// Reported to clients in the `initialize` reply.
    pub server_name: String,
    pub server_version: String,
}

impl HubSettings {
    pub fn from_config(session: &SessionConfig, server_name: impl Into<String>) -> Self {
        Self {
            inbound_buffer: session.inbound_buffer.max(1),
            outbound_buffer: session.outbound_buffer.max(1),
            max_in_flight: session.max_in_flight.max(1),
            idle_timeout: (session.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(session.idle_timeout_secs)),
            server_name: server_name.into(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default(), "keygate")
    }
}

/// Cancels its session when dropped. Held by whoever consumes the outbound
/// stream, so a client that goes away closes its session.
#[derive(Debug)]
pub struct SessionGuard {
    cancel: CancellationToken,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The client's end of a freshly opened session.
#[derive(Debug)]
pub struct OpenedSession {
    pub id: SessionId,
    pub credential_id: CredentialId,
    replies: mpsc::Receiver<SessionReply>,
    guard: SessionGuard,
}

impl OpenedSession {
    /// Next reply, or `None` once the session is closing.
    ///
    /// Replies still queued when the session is cancelled are dropped.
    pub async fn recv(&mut self) -> Option<SessionReply> {
        tokio::select! {
            biased;

            _ = self.guard.cancel.cancelled() => {
                self.replies.close();
                None
            }

            reply = self.replies.recv() => reply,
        }
    }

    /// Replies as a stream. The session stays open while the stream is alive
    /// and closes when it is dropped.
    pub fn into_stream(self) -> impl Stream<Item = SessionReply> + Send + 'static {
        futures::stream::unfold(self, |mut session| async move {
            let reply = session.recv().await?;
            Some((reply, session))
        })
    }
}

pub struct SessionHub {
    credentials: Arc<dyn CredentialStore>,
    policy: Arc<dyn PermissionPolicy>,
    dispatcher: Arc<Dispatcher>,
    repository: Arc<InMemorySessionRepository>,
    audit: Arc<AuditLogger>,
    settings: HubSettings,
    shutdown: CancellationToken,
    workers: TaskTracker,
}

impl SessionHub {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        policy: Arc<dyn PermissionPolicy>,
        dispatcher: Arc<Dispatcher>,
        settings: HubSettings,
    ) -> Self {
        Self {
            credentials,
            policy,
            dispatcher,
            repository: Arc::new(InMemorySessionRepository::new()),
            audit: Arc::new(AuditLogger::new()),
            settings,
            shutdown: CancellationToken::new(),
            workers: TaskTracker::new(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Check a raw `Authorization` header without opening a session.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Credential, AuthenticationError> {
        self.credentials.authenticate(authorization)
    }

    /// Authenticate and, on success, open an `Active` session with its own
    /// authorization context and worker.
    pub fn handshake(&self, authorization: Option<&str>) -> Result<OpenedSession, HandshakeError> {
        let mut session = Session::connecting();

        let credential = match self.credentials.authenticate(authorization) {
            Ok(credential) => credential,
            Err(error) => {
                session.reject()?;
                self.audit.handshake_rejected(error);
                return Err(error.into());
            }
        };

        if self.shutdown.is_cancelled() {
            session.reject()?;
            return Err(HandshakeError::ShuttingDown);
        }

        let id = session.id;
        let credential_id = credential.id.clone();
        session.activate(credential_id.clone())?;

        let permissions = self.policy.permissions_for(&credential_id);
        let context = Arc::new(AuthorizationContext::new(id, credential, permissions));

        let (inbound_tx, inbound_rx) = mpsc::channel(self.settings.inbound_buffer);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.settings.outbound_buffer);
        let cancel = self.shutdown.child_token();

        let handle = Arc::new(SessionHandle::new(
            session,
            credential_id.clone(),
            inbound_tx,
            cancel.clone(),
        ));
        self.repository.insert(Arc::clone(&handle));
        self.audit
            .handshake_accepted(id, &credential_id, self.repository.len());

        let worker = SessionWorker {
            handle,
            context,
            inbound: inbound_rx,
            outbound: outbound_tx,
            dispatcher: Arc::clone(&self.dispatcher),
            repository: Arc::clone(&self.repository),
            audit: Arc::clone(&self.audit),
            settings: self.settings.clone(),
        };
        self.workers.spawn(worker.run());

        Ok(OpenedSession {
            id,
            credential_id,
            replies: outbound_rx,
            guard: SessionGuard { cancel },
        })
    }

    /// Enqueue a message on a session owned by `credential_id`.
    ///
    /// A session that exists but belongs to another credential is reported as
    /// not found. Waits while the session's inbound queue is full; if the
    /// session closes meanwhile, returns `StreamClosed`.
    pub async fn submit(
        &self,
        session_id: SessionId,
        credential_id: &CredentialId,
        message: InboundMessage,
    ) -> Result<(), TransportError> {
        let handle = self.owned_handle(session_id, credential_id)?;
        if !handle.is_active() {
            return Err(TransportError::StreamClosed);
        }
        handle.enqueue(message).await
    }

    /// Close a session and wait until its worker has released everything.
    pub async fn close(
        &self,
        session_id: SessionId,
        credential_id: &CredentialId,
        reason: CloseReason,
    ) -> Result<(), TransportError> {
        let handle = self.owned_handle(session_id, credential_id)?;
        if !handle.request_close(reason) {
            return Err(TransportError::StreamClosed);
        }
        handle.closed().await;
        Ok(())
    }

    /// Close every session with `ServerShutdown`, refuse new handshakes, and
    /// wait for all workers to finish.
    pub async fn close_all(&self) {
        for handle in self.repository.all() {
            handle.request_close(CloseReason::ServerShutdown);
        }
        self.shutdown.cancel();
        self.workers.close();
        self.workers.wait().await;
    }

    pub fn session(&self, session_id: SessionId) -> Option<Session> {
        self.repository.get(&session_id).map(|handle| handle.snapshot())
    }

    pub fn active_sessions(&self) -> usize {
        self.repository.len()
    }

    fn owned_handle(
        &self,
        session_id: SessionId,
        credential_id: &CredentialId,
    ) -> Result<Arc<SessionHandle>, TransportError> {
        self.repository
            .get(&session_id)
            .filter(|handle| handle.credential_id() == credential_id)
            .ok_or(TransportError::SessionNotFound)
    }
}

struct SessionWorker {
    handle: Arc<SessionHandle>,
    context: Arc<AuthorizationContext>,
    inbound: mpsc::Receiver<InboundMessage>,
    outbound: mpsc::Sender<SessionReply>,
    dispatcher: Arc<Dispatcher>,
    repository: Arc<InMemorySessionRepository>,
    audit: Arc<AuditLogger>,
    settings: HubSettings,
}

impl SessionWorker {
    async fn run(mut self) {
        let id = self.handle.id();
        let cancel = self.handle.cancel_token().clone();
        let max_in_flight = self.settings.max_in_flight;
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut last_activity = Instant::now();

        debug!(session_id = %id, "Session worker started");

        loop {
            // The idle clock only runs while nothing is in flight.
            let idle_deadline = match self.settings.idle_timeout {
                Some(timeout) if in_flight.is_empty() => Some(last_activity + timeout),
                _ => None,
            };
            let idle = async move {
                match idle_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                message = self.inbound.recv(), if in_flight.len() < max_in_flight => match message {
                    Some(message) => {
                        last_activity = Instant::now();
                        self.accept(message, &mut in_flight, &cancel);
                    }
                    None => break,
                },

                Some(joined) = in_flight.join_next() => {
                    last_activity = Instant::now();
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(session_id = %id, "Call task panicked outside the handler");
                        }
                    }
                }

                _ = idle => {
                    self.handle.request_close(CloseReason::IdleTimeout);
                    break;
                }
            }
        }

        self.shutdown(in_flight).await;
    }

    fn accept(&self, message: InboundMessage, in_flight: &mut JoinSet<()>, cancel: &CancellationToken) {
        let (origin, work) = match message {
            InboundMessage::Notification { method } => {
                debug!(session_id = %self.handle.id(), %method, "Notification received");
                return;
            }
            InboundMessage::Call(call) => {
                let origin = ReplyOrigin::Call {
                    kind: call.kind,
                    capability: call.capability.clone(),
                };
                (origin, Work::Call(call))
            }
            InboundMessage::Control { correlation_id, request } => {
                let (origin, envelope) = self.control(correlation_id, request);
                (origin, Work::Ready(envelope))
            }
        };

        let task = CallTask {
            handle: Arc::clone(&self.handle),
            context: Arc::clone(&self.context),
            dispatcher: Arc::clone(&self.dispatcher),
            audit: Arc::clone(&self.audit),
            outbound: self.outbound.clone(),
            cancel: cancel.clone(),
        };
        in_flight.spawn(task.run(origin, work));
    }

    fn control(&self, correlation_id: CorrelationId, request: ControlRequest) -> (ReplyOrigin, ResultEnvelope) {
        match request {
            ControlRequest::Initialize => (
                ReplyOrigin::Initialize,
                ResultEnvelope::success(
                    correlation_id,
                    json!({
                        "name": self.settings.server_name,
                        "version": self.settings.server_version,
                    }),
                ),
            ),
            ControlRequest::Ping => (ReplyOrigin::Ping, ResultEnvelope::success(correlation_id, json!({}))),
            ControlRequest::List(kind) => {
                let summaries = self.dispatcher.list_capabilities(kind, &self.context);
                let value = serde_json::to_value(summaries).unwrap_or_else(|_| json!([]));
                (ReplyOrigin::List(kind), ResultEnvelope::success(correlation_id, value))
            }
            ControlRequest::ListResourceTemplates => {
                let summaries = self.dispatcher.list_resource_templates(&self.context);
                let value = serde_json::to_value(summaries).unwrap_or_else(|_| json!([]));
                (ReplyOrigin::ListResourceTemplates, ResultEnvelope::success(correlation_id, value))
            }
            ControlRequest::Reject(error) => (ReplyOrigin::Rejected, ResultEnvelope::error(correlation_id, error)),
        }
    }

    async fn shutdown(self, mut in_flight: JoinSet<()>) {
        let id = self.handle.id();
        let reason = self.handle.settle_close_reason(CloseReason::ClientDisconnected);
        self.handle.cancel_token().cancel();

        in_flight.shutdown().await;

        let SessionWorker {
            handle,
            context,
            inbound,
            outbound,
            repository,
            audit,
            ..
        } = self;
        drop(inbound);
        drop(outbound);
        drop(context);

        repository.remove(&id);
        if let Err(e) = handle.finish_close() {
            error!(session_id = %id, "Session teardown out of order: {}", e);
        }
        audit.session_closed(id, &reason, repository.len());
    }
}

enum Work {
    Call(CallEnvelope),
    Ready(ResultEnvelope),
}

struct CallTask {
    handle: Arc<SessionHandle>,
    context: Arc<AuthorizationContext>,
    dispatcher: Arc<Dispatcher>,
    audit: Arc<AuditLogger>,
    outbound: mpsc::Sender<SessionReply>,
    cancel: CancellationToken,
}

impl CallTask {
    async fn run(self, origin: ReplyOrigin, work: Work) {
        let envelope = match work {
            Work::Ready(envelope) => envelope,
            Work::Call(call) => {
                let started = std::time::Instant::now();
                let (kind, capability) = (call.kind, call.capability.clone());
                let envelope = self.dispatcher.dispatch(call, &self.context).await;
                self.audit.call_completed(
                    self.handle.id(),
                    self.handle.credential_id(),
                    kind,
                    &capability,
                    &envelope,
                    started.elapsed(),
                );
                envelope
            }
        };

        let label = match &origin {
            ReplyOrigin::Call { capability, .. } => capability.clone(),
            _ => "control".to_string(),
        };
        let reply = SessionReply { origin, envelope };

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                self.audit.result_discarded(self.handle.id(), &label);
            }

            sent = self.outbound.send(reply) => {
                if sent.is_err() {
                    self.handle.request_close(CloseReason::StreamClosed);
                }
            }
        }
    }
}
