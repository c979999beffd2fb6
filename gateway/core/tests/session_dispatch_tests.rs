// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use keygate_core::application::dispatcher::Dispatcher;
use keygate_core::application::session_service::{HandshakeError, HubSettings, OpenedSession, SessionHub};
use keygate_core::domain::authorization::AuthorizationContext;
use keygate_core::domain::capability::{CapabilityDescriptor, CapabilityHandler, CapabilityKind, FnHandler};
use keygate_core::domain::credential::{AuthenticationError, CredentialId};
use keygate_core::domain::envelope::{CallEnvelope, CorrelationId, DispatchError};
use keygate_core::domain::gateway_config::{CredentialConfig, DispatchOrder, ListingPolicy};
use keygate_core::domain::message::{ControlRequest, InboundMessage, ReplyOrigin, SessionReply};
use keygate_core::domain::permission::PermissionPolicy;
use keygate_core::domain::session::{CloseReason, SessionId, SessionState, TransportError};
use keygate_core::infrastructure::credential_store::StaticCredentialStore;
use keygate_core::infrastructure::permission_policy::StaticPermissionPolicy;
use keygate_core::infrastructure::registry::CapabilityRegistryBuilder;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Reports which credential and session the handler was invoked for.
struct WhoAmI;

#[async_trait]
impl CapabilityHandler for WhoAmI {
    async fn invoke(&self, _arguments: Value, context: &AuthorizationContext) -> anyhow::Result<Value> {
        tokio::task::yield_now().await;
        Ok(json!({
            "credential": context.credential().id.as_str(),
            "session": context.session_id().to_string(),
        }))
    }
}

/// Sleeps for `ms` milliseconds, then counts a completion.
struct Slow {
    finished: Arc<AtomicUsize>,
}

#[async_trait]
impl CapabilityHandler for Slow {
    async fn invoke(&self, arguments: Value, _context: &AuthorizationContext) -> anyhow::Result<Value> {
        let ms = arguments["ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "slept_ms": ms }))
    }
}

fn numbers() -> Value {
    json!({
        "type": "object",
        "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
        "required": ["a", "b"]
    })
}

fn credentials() -> Vec<CredentialConfig> {
    let entry = |token: &str, permissions: &[&str]| CredentialConfig {
        id: format!("{token}-client"),
        token: token.to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    };
    vec![
        entry("key1", &["add", "subtract", "whoami", "slow", "greeting://*"]),
        entry("key2", &["add", "whoami"]),
        entry("key3", &["subtract"]),
    ]
}

struct Fixture {
    hub: Arc<SessionHub>,
    finished: Arc<AtomicUsize>,
}

fn fixture_with(order: DispatchOrder, listing: ListingPolicy, settings: HubSettings) -> Fixture {
    let finished = Arc::new(AtomicUsize::new(0));

    let mut builder = CapabilityRegistryBuilder::new();
    builder
        .register(CapabilityDescriptor::tool(
            "add",
            "Add two numbers",
            numbers(),
            Arc::new(FnHandler::new(|args: Value| async move {
                Ok(json!(args["a"].as_f64().unwrap_or_default() + args["b"].as_f64().unwrap_or_default()))
            })),
        ))
        .unwrap()
        .register(CapabilityDescriptor::tool(
            "subtract",
            "Subtract two numbers",
            numbers(),
            Arc::new(FnHandler::new(|args: Value| async move {
                Ok(json!(args["a"].as_f64().unwrap_or_default() - args["b"].as_f64().unwrap_or_default()))
            })),
        ))
        .unwrap()
        .register(CapabilityDescriptor::tool(
            "whoami",
            "Echo the caller",
            json!({ "type": "object" }),
            Arc::new(WhoAmI),
        ))
        .unwrap()
        .register(CapabilityDescriptor::tool(
            "slow",
            "Sleep",
            json!({ "type": "object", "properties": { "ms": { "type": "integer" } } }),
            Arc::new(Slow { finished: finished.clone() }),
        ))
        .unwrap()
        .register(CapabilityDescriptor::resource_template(
            "greeting://{name}",
            "Greet by name",
            json!({
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "required": ["name"]
            }),
            Arc::new(FnHandler::new(|args: Value| async move {
                Ok(json!(format!("Hello, {}!", args["name"].as_str().unwrap_or_default())))
            })),
        ))
        .unwrap();

    let entries = credentials();
    let store = StaticCredentialStore::from_config(&entries).unwrap();
    let policy: Arc<dyn PermissionPolicy> = Arc::new(StaticPermissionPolicy::from_config(&entries));
    let dispatcher = Dispatcher::new(builder.build(), policy.clone())
        .with_order(order)
        .with_listing(listing);

    Fixture {
        hub: Arc::new(SessionHub::new(Arc::new(store), policy, Arc::new(dispatcher), settings)),
        finished,
    }
}

fn fixture() -> Fixture {
    fixture_with(DispatchOrder::ExistenceFirst, ListingPolicy::All, HubSettings::default())
}

fn open(hub: &SessionHub, token: &str) -> OpenedSession {
    hub.handshake(Some(&format!("Bearer {token}"))).unwrap()
}

async fn call(hub: &SessionHub, session: &OpenedSession, id: i64, capability: &str, arguments: Value) {
    hub.submit(
        session.id,
        &session.credential_id,
        InboundMessage::Call(CallEnvelope::tool(id, capability, arguments)),
    )
    .await
    .unwrap();
}

async fn next(session: &mut OpenedSession) -> SessionReply {
    timeout(Duration::from_secs(5), session.recv())
        .await
        .expect("timed out waiting for a reply")
        .expect("session closed before replying")
}

async fn wait_until_closed(hub: &SessionHub) {
    timeout(Duration::from_secs(5), async {
        while hub.active_sessions() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sessions did not close");
}

#[tokio::test]
async fn test_key1_may_add_and_subtract() {
    let Fixture { hub, .. } = fixture();
    let mut session = open(&hub, "key1");

    call(&hub, &session, 1, "add", json!({ "a": 2, "b": 3 })).await;
    let reply = next(&mut session).await;
    assert_eq!(reply.correlation_id(), &CorrelationId::Number(1));
    assert_eq!(reply.envelope.value(), Some(&json!(5.0)));

    call(&hub, &session, 2, "subtract", json!({ "a": 5, "b": 3 })).await;
    let reply = next(&mut session).await;
    assert_eq!(reply.envelope.value(), Some(&json!(2.0)));
}

#[tokio::test]
async fn test_denial_does_not_end_the_session() {
    let Fixture { hub, .. } = fixture();
    let mut session = open(&hub, "key2");

    call(&hub, &session, 1, "subtract", json!({ "a": 5, "b": 3 })).await;
    let denied = next(&mut session).await;
    assert_eq!(
        denied.envelope.error_kind(),
        Some(&DispatchError::PermissionDenied { name: "subtract".into() })
    );

    call(&hub, &session, 2, "add", json!({ "a": 2, "b": 3 })).await;
    let allowed = next(&mut session).await;
    assert_eq!(allowed.envelope.value(), Some(&json!(5.0)));
    assert_eq!(hub.session(session.id).map(|s| s.state), Some(SessionState::Active));
}

#[tokio::test]
async fn test_unknown_capability_is_not_found() {
    let Fixture { hub, .. } = fixture();
    let mut session = open(&hub, "key1");

    call(&hub, &session, 7, "multiply", json!({ "a": 2, "b": 3 })).await;
    let reply = next(&mut session).await;
    assert_eq!(
        reply.envelope.error_kind(),
        Some(&DispatchError::CapabilityNotFound { kind: CapabilityKind::Tool, name: "multiply".into() })
    );
}

#[tokio::test]
async fn test_deny_first_reports_denial_for_unknown_names() {
    let Fixture { hub, .. } = fixture_with(DispatchOrder::DenyFirst, ListingPolicy::All, HubSettings::default());
    let mut session = open(&hub, "key3");

    call(&hub, &session, 1, "multiply", json!({})).await;
    let reply = next(&mut session).await;
    assert!(matches!(reply.envelope.error_kind(), Some(DispatchError::PermissionDenied { .. })));
}

#[tokio::test]
async fn test_failed_handshakes_open_nothing() {
    let Fixture { hub, .. } = fixture();

    let cases = [
        (None, AuthenticationError::Missing),
        (Some("key1"), AuthenticationError::Malformed),
        (Some("Basic key1"), AuthenticationError::Malformed),
        (Some("Bearer "), AuthenticationError::Malformed),
        (Some("Bearer key9"), AuthenticationError::Unknown),
    ];
    for (header, expected) in cases {
        match hub.handshake(header) {
            Err(HandshakeError::Authentication(e)) => assert_eq!(e, expected, "{header:?}"),
            other => panic!("unexpected handshake result for {header:?}: {other:?}"),
        }
    }
    assert_eq!(hub.active_sessions(), 0);
}

#[tokio::test]
async fn test_concurrent_sessions_never_see_each_others_context() {
    let Fixture { hub, .. } = fixture();
    let mut first = open(&hub, "key1");
    let mut second = open(&hub, "key2");

    const CALLS: i64 = 25;
    let submit_all = |session_id: SessionId, credential_id: CredentialId| {
        let hub = hub.clone();
        tokio::spawn(async move {
            for id in 0..CALLS {
                hub.submit(
                    session_id,
                    &credential_id,
                    InboundMessage::Call(CallEnvelope::tool(id, "whoami", json!({}))),
                )
                .await
                .unwrap();
            }
        })
    };
    let a = submit_all(first.id, first.credential_id.clone());
    let b = submit_all(second.id, second.credential_id.clone());

    for _ in 0..CALLS {
        let reply = next(&mut first).await;
        assert_eq!(reply.envelope.value().unwrap()["credential"], json!("key1-client"));
        assert_eq!(reply.envelope.value().unwrap()["session"], json!(first.id.to_string()));

        let reply = next(&mut second).await;
        assert_eq!(reply.envelope.value().unwrap()["credential"], json!("key2-client"));
        assert_eq!(reply.envelope.value().unwrap()["session"], json!(second.id.to_string()));
    }
    a.await.unwrap();
    b.await.unwrap();
}

#[tokio::test]
async fn test_results_complete_out_of_order_with_their_own_ids() {
    let Fixture { hub, .. } = fixture();
    let mut session = open(&hub, "key1");

    call(&hub, &session, 100, "slow", json!({ "ms": 300 })).await;
    call(&hub, &session, 200, "add", json!({ "a": 1, "b": 1 })).await;

    let first = next(&mut session).await;
    let second = next(&mut session).await;
    assert_eq!(first.correlation_id(), &CorrelationId::Number(200));
    assert_eq!(second.correlation_id(), &CorrelationId::Number(100));
    assert_eq!(second.envelope.value(), Some(&json!({ "slept_ms": 300 })));
}

#[tokio::test]
async fn test_close_discards_outstanding_results() {
    let Fixture { hub, finished } = fixture();
    let mut session = open(&hub, "key1");
    let (id, credential_id) = (session.id, session.credential_id.clone());

    call(&hub, &session, 1, "slow", json!({ "ms": 2000 })).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    hub.close(id, &credential_id, CloseReason::ClientRequested)
        .await
        .unwrap();

    // The reply stream ends without delivering the slow result.
    assert!(timeout(Duration::from_secs(5), session.recv()).await.unwrap().is_none());
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert!(hub.session(id).is_none());
    assert_eq!(hub.active_sessions(), 0);

    let late = hub
        .submit(id, &credential_id, InboundMessage::Call(CallEnvelope::tool(2_i64, "add", json!({ "a": 1, "b": 1 }))))
        .await;
    assert_eq!(late, Err(TransportError::SessionNotFound));
}

#[tokio::test]
async fn test_sessions_are_bound_to_their_credential() {
    let Fixture { hub, .. } = fixture();
    let session = open(&hub, "key1");

    let result = hub
        .submit(
            session.id,
            &CredentialId::new("key2-client"),
            InboundMessage::Call(CallEnvelope::tool(1_i64, "add", json!({ "a": 1, "b": 1 }))),
        )
        .await;
    assert_eq!(result, Err(TransportError::SessionNotFound));
}

#[tokio::test]
async fn test_dropping_the_client_end_closes_the_session() {
    let Fixture { hub, .. } = fixture();
    let session = open(&hub, "key2");
    assert_eq!(hub.active_sessions(), 1);

    drop(session);
    wait_until_closed(&hub).await;
}

#[tokio::test]
async fn test_idle_sessions_time_out() {
    let settings = HubSettings {
        idle_timeout: Some(Duration::from_millis(200)),
        ..HubSettings::default()
    };
    let Fixture { hub, .. } = fixture_with(DispatchOrder::ExistenceFirst, ListingPolicy::All, settings);
    let mut session = open(&hub, "key1");

    // A call that outlives the idle window keeps the session open.
    call(&hub, &session, 1, "slow", json!({ "ms": 400 })).await;
    let reply = next(&mut session).await;
    assert!(reply.envelope.is_success());

    assert!(timeout(Duration::from_secs(5), session.recv()).await.unwrap().is_none());
    assert_eq!(hub.active_sessions(), 0);
}

#[tokio::test]
async fn test_close_all_shuts_every_session_and_refuses_new_ones() {
    let Fixture { hub, .. } = fixture();
    let mut first = open(&hub, "key1");
    let mut second = open(&hub, "key3");

    timeout(Duration::from_secs(5), hub.close_all()).await.unwrap();

    assert_eq!(hub.active_sessions(), 0);
    assert!(first.recv().await.is_none());
    assert!(second.recv().await.is_none());
    assert!(matches!(hub.handshake(Some("Bearer key1")), Err(HandshakeError::ShuttingDown)));
}

fn add_call(n: i64) -> InboundMessage {
    InboundMessage::Call(CallEnvelope::tool(n, "add", json!({ "a": n, "b": 1 })))
}

fn tight_settings() -> HubSettings {
    HubSettings {
        inbound_buffer: 1,
        outbound_buffer: 1,
        max_in_flight: 1,
        ..HubSettings::default()
    }
}

/// Submit `add` calls without reading replies until one submission stalls.
/// Returns how many were accepted.
async fn submit_until_stalled(hub: &SessionHub, id: SessionId, credential_id: &CredentialId) -> i64 {
    let mut accepted = 0;
    while accepted < 100 {
        match timeout(Duration::from_millis(200), hub.submit(id, credential_id, add_call(accepted))).await {
            Ok(result) => {
                result.unwrap();
                accepted += 1;
            }
            Err(_) => break,
        }
    }
    accepted
}

#[tokio::test]
async fn test_submit_stalls_while_the_reader_is_idle() {
    let Fixture { hub, .. } = fixture_with(DispatchOrder::ExistenceFirst, ListingPolicy::All, tight_settings());
    let mut session = open(&hub, "key1");
    let (id, credential_id) = (session.id, session.credential_id.clone());

    // One reply in the outbound queue, one call holding its reply, one
    // message in the inbound queue. Everything after that waits.
    let accepted = submit_until_stalled(&hub, id, &credential_id).await;
    assert!(accepted >= 1, "nothing was accepted");
    assert!(accepted <= 3, "accepted {accepted} submissions with no reader");

    const CALLS: i64 = 20;
    let submitter = {
        let hub = hub.clone();
        let credential_id = credential_id.clone();
        tokio::spawn(async move {
            for n in accepted..CALLS {
                hub.submit(id, &credential_id, add_call(n)).await.unwrap();
            }
        })
    };

    // Reading drains the queues and lets the submitter through; nothing is lost.
    let mut seen = Vec::new();
    for _ in 0..CALLS {
        let reply = next(&mut session).await;
        assert!(reply.envelope.is_success());
        seen.push(reply.correlation_id().clone());
    }
    timeout(Duration::from_secs(5), submitter).await.unwrap().unwrap();

    seen.sort_by_key(|id| match id {
        CorrelationId::Number(n) => *n,
        CorrelationId::String(_) => i64::MAX,
    });
    assert_eq!(seen, (0..CALLS).map(CorrelationId::Number).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_replies_queued_at_close_are_not_delivered() {
    let Fixture { hub, .. } = fixture();
    let mut session = open(&hub, "key1");
    let (id, credential_id) = (session.id, session.credential_id.clone());

    call(&hub, &session, 1, "add", json!({ "a": 1, "b": 0 })).await;
    // The reply is computed and waiting in the outbound queue.
    tokio::time::sleep(Duration::from_millis(100)).await;

    hub.close(id, &credential_id, CloseReason::ClientRequested)
        .await
        .unwrap();
    assert!(hub.session(id).is_none());

    assert!(timeout(Duration::from_secs(5), session.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_close_releases_submitters_waiting_on_a_full_queue() {
    let Fixture { hub, .. } = fixture_with(DispatchOrder::ExistenceFirst, ListingPolicy::All, tight_settings());
    let mut session = open(&hub, "key1");
    let (id, credential_id) = (session.id, session.credential_id.clone());

    submit_until_stalled(&hub, id, &credential_id).await;

    let waiting = {
        let hub = hub.clone();
        let credential_id = credential_id.clone();
        tokio::spawn(async move { hub.submit(id, &credential_id, add_call(99)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiting.is_finished());

    timeout(Duration::from_secs(5), hub.close(id, &credential_id, CloseReason::ClientRequested))
        .await
        .expect("close hung with a full inbound queue")
        .unwrap();

    let released = timeout(Duration::from_secs(5), waiting)
        .await
        .expect("waiting submitter was not released")
        .unwrap();
    assert_eq!(released, Err(TransportError::StreamClosed));

    assert_eq!(hub.submit(id, &credential_id, add_call(100)).await, Err(TransportError::SessionNotFound));
    assert!(timeout(Duration::from_secs(5), session.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_control_requests_are_answered_by_the_gateway() {
    let Fixture { hub, .. } = fixture_with(DispatchOrder::ExistenceFirst, ListingPolicy::Permitted, HubSettings::default());
    let mut session = open(&hub, "key3");

    let control = |id: i64, request| InboundMessage::Control {
        correlation_id: CorrelationId::Number(id),
        request,
    };

    hub.submit(session.id, &session.credential_id, control(1, ControlRequest::Initialize))
        .await
        .unwrap();
    let reply = next(&mut session).await;
    assert_eq!(reply.origin, ReplyOrigin::Initialize);
    assert_eq!(reply.envelope.value().unwrap()["name"], json!("keygate"));

    hub.submit(session.id, &session.credential_id, control(2, ControlRequest::List(CapabilityKind::Tool)))
        .await
        .unwrap();
    let reply = next(&mut session).await;
    let names: Vec<_> = reply
        .envelope
        .value()
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["subtract".to_string()]);

    // Notifications produce no reply; the next reply belongs to the ping.
    hub.submit(
        session.id,
        &session.credential_id,
        InboundMessage::Notification { method: "notifications/initialized".into() },
    )
    .await
    .unwrap();
    hub.submit(session.id, &session.credential_id, control(3, ControlRequest::Ping))
        .await
        .unwrap();
    let reply = next(&mut session).await;
    assert_eq!(reply.correlation_id(), &CorrelationId::Number(3));
    assert_eq!(reply.origin, ReplyOrigin::Ping);
}

#[tokio::test]
async fn test_templated_resource_reads_are_gated_on_the_template() {
    let Fixture { hub, .. } = fixture();
    let mut permitted = open(&hub, "key1");
    let mut forbidden = open(&hub, "key2");

    let read = |id: i64, uri: &str| {
        InboundMessage::Call(CallEnvelope::new(id, CapabilityKind::Resource, uri, json!({})))
    };

    hub.submit(permitted.id, &permitted.credential_id, read(1, "greeting://Ada"))
        .await
        .unwrap();
    let reply = next(&mut permitted).await;
    assert_eq!(
        reply.origin,
        ReplyOrigin::Call { kind: CapabilityKind::Resource, capability: "greeting://Ada".into() }
    );
    assert_eq!(reply.envelope.value(), Some(&json!("Hello, Ada!")));

    hub.submit(forbidden.id, &forbidden.credential_id, read(2, "greeting://Ada"))
        .await
        .unwrap();
    let reply = next(&mut forbidden).await;
    assert_eq!(
        reply.envelope.error_kind(),
        Some(&DispatchError::PermissionDenied { name: "greeting://Ada".into() })
    );

    hub.submit(
        permitted.id,
        &permitted.credential_id,
        InboundMessage::Control {
            correlation_id: CorrelationId::Number(3),
            request: ControlRequest::ListResourceTemplates,
        },
    )
    .await
    .unwrap();
    let reply = next(&mut permitted).await;
    assert_eq!(reply.origin, ReplyOrigin::ListResourceTemplates);
    assert_eq!(reply.envelope.value().unwrap()[0]["name"], json!("greeting://{name}"));
}
