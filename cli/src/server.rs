// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Gateway HTTP server
//!
//! Builds the session hub from a [`GatewayConfigManifest`], mounts the SSE
//! transport next to `/health` and `/metrics`, and serves until Ctrl+C or
//! SIGTERM. Open sessions are closed before the process exits.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use keygate_core::application::dispatcher::Dispatcher;
use keygate_core::application::session_service::{HubSettings, SessionHub};
use keygate_core::domain::gateway_config::GatewayConfigManifest;
use keygate_core::domain::permission::PermissionPolicy;
use keygate_core::infrastructure::credential_store::StaticCredentialStore;
use keygate_core::infrastructure::permission_policy::StaticPermissionPolicy;
use keygate_core::infrastructure::registry::CapabilityRegistry;
use keygate_core::presentation::api;

#[derive(Clone)]
struct OpsState {
    hub: Arc<SessionHub>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

/// Wire credentials, permissions and the registry into a hub.
pub fn build_hub(manifest: &GatewayConfigManifest, registry: Arc<CapabilityRegistry>) -> Result<Arc<SessionHub>> {
    let spec = &manifest.spec;

    let credentials = StaticCredentialStore::from_config(&spec.credentials)
        .context("Failed to load credentials")?;
    let policy: Arc<dyn PermissionPolicy> = Arc::new(StaticPermissionPolicy::from_config(&spec.credentials));

    let dispatcher = Dispatcher::new(registry, policy.clone())
        .with_order(spec.policy.dispatch_order)
        .with_listing(spec.policy.listing);

    Ok(Arc::new(SessionHub::new(
        Arc::new(credentials),
        policy,
        Arc::new(dispatcher),
        HubSettings::from_config(&spec.session, manifest.metadata.name.clone()),
    )))
}

/// Full router: MCP transport plus operational endpoints.
pub fn router(manifest: &GatewayConfigManifest, hub: Arc<SessionHub>, metrics: Option<PrometheusHandle>) -> Router {
    let ops = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(OpsState {
            hub: hub.clone(),
            metrics,
            start_time: Instant::now(),
        });

    api::app(hub, &manifest.spec.http)
        .merge(ops)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(manifest: GatewayConfigManifest, registry: Arc<CapabilityRegistry>) -> Result<()> {
    manifest.validate().context("Configuration validation failed")?;

    let metrics = if manifest.spec.observability.metrics_enabled {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install Prometheus recorder")?,
        )
    } else {
        None
    };

    let hub = build_hub(&manifest, registry)?;
    let app = router(&manifest, hub.clone(), metrics);

    let server = &manifest.spec.server;
    let addr = format!("{}:{}", server.bind_address, server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(
        "Keygate '{}' listening on {} (sse: {}, messages: {})",
        manifest.metadata.name, addr, manifest.spec.http.sse_path, manifest.spec.http.messages_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Closing {} open session(s)", hub.active_sessions());
    hub.close_all().await;
    info!("Keygate shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

async fn health_handler(State(state): State<OpsState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "active_sessions": state.hub.active_sessions(),
    }))
}

async fn metrics_handler(State(state): State<OpsState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::demo_registry;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn manifest() -> GatewayConfigManifest {
        GatewayConfigManifest::from_yaml_str(include_str!("../templates/keygate-config.yaml")).unwrap()
    }

    #[tokio::test]
    async fn health_reports_sessions() {
        let manifest = manifest();
        let hub = build_hub(&manifest, demo_registry().unwrap()).unwrap();
        let app = router(&manifest, hub, None);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["active_sessions"], 0);
    }

    #[tokio::test]
    async fn metrics_are_not_found_when_disabled() {
        let manifest = manifest();
        let hub = build_hub(&manifest, demo_registry().unwrap()).unwrap();
        let app = router(&manifest, hub, None);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sse_requires_a_known_key() {
        let manifest = manifest();
        let hub = build_hub(&manifest, demo_registry().unwrap()).unwrap();
        let app = router(&manifest, hub, None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/sse")
                    .header("authorization", "Bearer key4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
