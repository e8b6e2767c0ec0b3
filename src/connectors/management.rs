use crate::app_state::AppState;
use crate::config::spec::{ManagementConfig, ManagementEndpointConfig};
use crate::error::{Context, Result};
use crate::metrics::metrics as metrics_collector;
use crate::reporter::{CheckProfile, CheckVerdict};
use crate::retry::retry_after_seconds;
use axum::body::Body;
use axum::http::{
    header::{CONTENT_TYPE, RETRY_AFTER},
    HeaderValue, StatusCode,
};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct ManagementServer {
    addr: SocketAddr,
    live: Option<ManagementEndpointConfig>,
    ready: Option<ManagementEndpointConfig>,
    status: Option<ManagementEndpointConfig>,
    metrics: Option<ManagementEndpointConfig>,
}

impl ManagementServer {
    pub fn build(config: &ManagementConfig) -> Result<Option<Self>> {
        if config.live.is_none()
            && config.ready.is_none()
            && config.status.is_none()
            && config.metrics.is_none()
        {
            return Ok(None);
        }

        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid management listen address {}:{}",
                    config.host, config.port
                )
            })?;

        Ok(Some(Self {
            addr,
            live: config.live.clone(),
            ready: config.ready.clone(),
            status: config.status.clone(),
            metrics: config.metrics.clone(),
        }))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn serve(self, state: AppState, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind management listener on {}", self.addr))?;
        self.serve_on(listener, state, shutdown).await
    }

    /// Serves on an already bound listener.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        state: AppState,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let local_addr = listener.local_addr().unwrap_or(self.addr);
        let router = self.router(state);

        tracing::info!("management server listening on {}", local_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            })
            .await
            .context("management server exited abnormally")?;

        Ok(())
    }

    fn router(&self, state: AppState) -> Router {
        let mut router = Router::new();

        if let Some(endpoint) = &self.live {
            router = router.route(endpoint.path.as_str(), get(live));
        }

        if let Some(endpoint) = &self.ready {
            router = router.route(endpoint.path.as_str(), get(ready));
        }

        if let Some(endpoint) = &self.status {
            router = router.route(endpoint.path.as_str(), get(status_report));
        }

        if let Some(endpoint) = &self.metrics {
            router = router.route(endpoint.path.as_str(), get(metrics));
        }

        router.layer(Extension(state))
    }
}

async fn live(Extension(state): Extension<AppState>) -> Response {
    check_response(&state.liveness).await
}

async fn ready(Extension(state): Extension<AppState>) -> Response {
    check_response(&state.readiness).await
}

async fn check_response(profile: &CheckProfile) -> Response {
    let verdict = profile.evaluate().await;
    let healthy = verdict.healthy;
    let mut response = Json(verdict_payload(&verdict)).into_response();

    if !healthy {
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        let retry_after = retry_after_seconds(profile.cache());
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
    }

    response
}

fn verdict_payload(verdict: &CheckVerdict) -> serde_json::Value {
    json!({
        "status": if verdict.healthy { "ok" } else { "failing" },
        "check": verdict.check,
        "ready": verdict.status.ready,
        "consecutive_failures": verdict.consecutive_failures,
        "failure_threshold": verdict.failure_threshold,
        "dependencies": verdict.status.dependencies,
    })
}

async fn status_report(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let status = state.monitor.current_status().await;
    let timestamp = Utc::now().to_rfc3339();

    (
        StatusCode::OK,
        Json(json!({
            "ready": status.ready,
            "dependencies": status.dependencies,
            "ts": timestamp,
        })),
    )
}

async fn metrics() -> Response {
    let body = metrics_collector().render_prometheus();

    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
