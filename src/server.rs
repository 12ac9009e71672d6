//! HTTP and websocket surface over the ingestion pipeline

use crate::bus::{keepalive_reply, ChannelSink, Interest};
use crate::config::BusConfig;
use crate::error::{GateDenial, PipelineError};
use crate::gate::audit::AuditOutcome;
use crate::gate::rules::RuleSet;
use crate::pipeline::IngestionPipeline;
use crate::types::transaction::Transaction;
use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{ConnectInfo, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub bus_config: BusConfig,
    /// Peers allowed to name the caller through `X-Forwarded-For`
    pub trusted_proxies: Arc<RuleSet>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/score", post(score))
        .route("/config", post(update_config))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/ws/all", get(ws_all))
        .route("/ws/fraud-only", get(ws_fraud_only))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API error type
#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    InvalidRequest(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Pipeline(e) => write!(f, "{}", e),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl From<GateDenial> for ApiError {
    fn from(err: GateDenial) -> Self {
        ApiError::Pipeline(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(PipelineError::Denied(GateDenial::Blacklisted(_))) => {
                StatusCode::FORBIDDEN
            }
            ApiError::Pipeline(PipelineError::Denied(GateDenial::RateLimited { .. })) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Pipeline(PipelineError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(PipelineError::ScoringUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Pipeline(PipelineError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Caller identity used by the gate.
///
/// `X-Forwarded-For` is honored only when the direct peer is a trusted
/// proxy. Hops are then read right to left, skipping trusted proxies, and
/// the first other hop is the caller. A hop that is not an IP address is
/// returned as is so the gate refuses it. Without a peer address the
/// identity is `unknown`, which the gate also refuses.
pub fn resolve_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &RuleSet,
) -> String {
    let Some(direct_ip) = peer.map(|addr| addr.ip()) else {
        return "unknown".to_string();
    };
    let Some(forwarded) = headers.get("x-forwarded-for") else {
        return direct_ip.to_string();
    };

    if !trusted_proxies.matches(&direct_ip) {
        warn!(
            direct_ip = %direct_ip,
            forwarded = ?forwarded,
            "Ignoring X-Forwarded-For from untrusted source"
        );
        return direct_ip.to_string();
    }

    let Ok(forwarded) = forwarded.to_str() else {
        return "unknown".to_string();
    };
    let hops: Vec<&str> = forwarded
        .split(',')
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();

    for hop in hops.iter().rev() {
        match hop.parse::<IpAddr>() {
            Ok(ip) if trusted_proxies.matches(&ip) => continue,
            _ => return hop.to_string(),
        }
    }

    // every hop is a proxy of ours
    hops.first()
        .map(|hop| hop.to_string())
        .unwrap_or_else(|| direct_ip.to_string())
}

fn identity_of(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> String {
    resolve_identity(headers, peer.map(|ConnectInfo(addr)| addr), &state.trusted_proxies)
}

async fn score(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(tx): Json<Transaction>,
) -> Result<Response, ApiError> {
    let identity = identity_of(&state, &headers, peer);
    let event = state.pipeline.handle(&identity, tx).await?;
    Ok(Json(event.as_ref()).into_response())
}

#[derive(Debug, Deserialize)]
struct ConfigUpdate {
    threshold: Option<f64>,
}

async fn update_config(
    State(state): State<AppState>,
    Query(update): Query<ConfigUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(requested) = update.threshold else {
        return Ok(Json(json!({
            "message": "No change",
            "threshold": state.pipeline.threshold(),
        })));
    };

    let applied = state.pipeline.set_threshold(requested).ok_or_else(|| {
        ApiError::InvalidRequest(format!("threshold must be a finite number, got {}", requested))
    })?;

    Ok(Json(json!({
        "message": format!("Threshold set to {}", applied),
        "threshold": applied,
    })))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "connections": state.pipeline.bus().subscriber_count(Interest::All),
    }))
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pipeline = &state.pipeline;
    Json(json!({
        "total_connections": pipeline.bus().total_subscribers(),
        "fraud_threshold": pipeline.threshold(),
        "last_updated": Utc::now().to_rfc3339(),
        "firewall_stats": pipeline.gate().stats(),
        "score_provider": pipeline.provider_name(),
        "metrics": pipeline.metrics().summary(),
    }))
}

async fn ws_all(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let identity = identity_of(&state, &headers, peer);
    upgrade(ws, state, identity, Interest::All)
}

async fn ws_fraud_only(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let identity = identity_of(&state, &headers, peer);
    upgrade(ws, state, identity, Interest::FraudOnly)
}

fn upgrade(ws: WebSocketUpgrade, state: AppState, identity: String, interest: Interest) -> Response {
    let channel = format!("/ws/{}", interest);
    if let Err(denial) = state
        .pipeline
        .gate()
        .admit_subscriber(&identity, &channel)
        .into_result()
    {
        return ApiError::from(denial).into_response();
    }

    ws.on_upgrade(move |socket| run_session(socket, state, identity, interest))
}

/// Drive one subscriber connection until either side goes away
async fn run_session(socket: WebSocket, state: AppState, identity: String, interest: Interest) {
    let (sink, mut frames) = ChannelSink::channel(
        state.bus_config.channel_capacity,
        Duration::from_millis(state.bus_config.delivery_timeout_ms),
    );
    let bus = Arc::clone(state.pipeline.bus());
    let subscriber = bus.subscribe(interest, Arc::new(sink.clone()));
    info!(identity = %identity, interest = %interest, subscriber = subscriber, "Subscriber connected");

    let (mut outbound, mut inbound) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let text = match frame.encode() {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if outbound.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let outcome: Result<(), String> = loop {
        tokio::select! {
            message = inbound.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = keepalive_reply(&text) {
                        if let Err(e) = sink.send_frame(reply).await {
                            break Err(e.to_string());
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.to_string()),
            },
            _ = sink.detached() => {
                break Err("dropped by the alert bus after a failed delivery".to_string());
            }
            _ = &mut writer => break Ok(()),
        }
    };

    bus.unsubscribe(interest, subscriber);
    writer.abort();

    let gate = state.pipeline.gate();
    match outcome {
        Ok(()) => {
            info!(identity = %identity, interest = %interest, "Subscriber disconnected");
            gate.audit(
                &identity,
                AuditOutcome::Disconnected,
                format!("subscriber /ws/{}", interest),
            );
        }
        Err(e) => {
            warn!(identity = %identity, interest = %interest, error = %e, "Subscriber connection error");
            gate.audit(
                &identity,
                AuditOutcome::Error,
                format!("subscriber /ws/{}: {}", interest, e),
            );
        }
    }
}
