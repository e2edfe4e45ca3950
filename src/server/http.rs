//! Trigger and health HTTP server.
//!
//! Exposes the internal trigger routes (`/notify-message`, `/notify-turn`),
//! subscription registration, VAPID public-key discovery, health/readiness
//! probes, and the Prometheus exposition endpoint. Trigger callers are
//! trusted internal services; these routes carry no authentication.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::notify::{Dispatcher, NotificationEvent};
use crate::store::{EndpointKeys, PushEndpoint, Store};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Option<Arc<dyn Store>>,
    /// Base64url VAPID public key, present when push is configured.
    pub push_public_key: Option<String>,
    pub metrics: Option<Metrics>,
}

/// Trigger and health HTTP server.
pub struct HttpServer {
    config: ServerConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Run the server until shutdown is signaled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let app = router(self.state.clone());

        let listener = TcpListener::bind(&self.config.bind_address).await?;
        info!(address = %self.config.bind_address, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
                info!("HTTP server shutting down");
            })
            .await?;

        Ok(())
    }
}

/// Build the route tree.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/notify-message", post(notify_message))
        .route("/notify-turn", post(notify_turn))
        .route("/subscriptions", post(register_subscription))
        .route("/push-key", get(push_key))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyMessageBody {
    #[serde(default)]
    room_id: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    sender_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyTurnBody {
    #[serde(default)]
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionBody {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    keys: Option<SubscriptionKeys>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionKeys {
    p256dh: String,
    auth: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
struct HealthResponse {
    status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
struct ReadyResponse {
    status: String,
    push_configured: bool,
    store_configured: bool,
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.is_empty())
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}

/// Trigger handler for a posted message.
async fn notify_message(
    State(state): State<AppState>,
    Json(body): Json<NotifyMessageBody>,
) -> Response {
    let (Some(room_id), Some(message_id), Some(sender_id)) = (
        required(body.room_id),
        required(body.message_id),
        required(body.sender_id),
    ) else {
        return bad_request("roomId, messageId and senderId are required");
    };

    let outcome = state
        .dispatcher
        .dispatch(NotificationEvent::MessagePosted {
            room_id,
            message_id,
            sender_id,
        })
        .await;
    Json(outcome).into_response()
}

/// Trigger handler for a turn change.
async fn notify_turn(State(state): State<AppState>, Json(body): Json<NotifyTurnBody>) -> Response {
    let Some(room_id) = required(body.room_id) else {
        return bad_request("roomId is required");
    };

    let outcome = state
        .dispatcher
        .dispatch(NotificationEvent::TurnAdvanced { room_id })
        .await;
    Json(outcome).into_response()
}

/// Registers a browser's push endpoint for a user.
async fn register_subscription(
    State(state): State<AppState>,
    Json(body): Json<SubscriptionBody>,
) -> Response {
    let (Some(user_id), Some(endpoint), Some(keys)) =
        (required(body.user_id), required(body.endpoint), body.keys)
    else {
        return bad_request("userId, endpoint and keys are required");
    };

    let Some(store) = &state.store else {
        return Json(json!({ "message": "Store is not configured" })).into_response();
    };

    let id = new_endpoint_id();
    let record = PushEndpoint {
        id: id.clone(),
        user_id,
        endpoint,
        keys: EndpointKeys {
            p256dh: keys.p256dh,
            auth: keys.auth,
        },
    };
    match store.add_endpoint(record).await {
        Ok(()) => Json(json!({ "id": id })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

fn new_endpoint_id() -> String {
    let mut bytes = [0u8; 12];
    openssl::rand::rand_bytes(&mut bytes).expect("OS randomness available");
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Serves the VAPID public key browsers subscribe with.
async fn push_key(State(state): State<AppState>) -> Response {
    match &state.push_public_key {
        Some(key) => Json(json!({ "publicKey": key })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Push delivery is not configured" })),
        )
            .into_response(),
    }
}

/// Liveness check handler.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check handler.
async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let push_configured = state.push_public_key.is_some();
    let store_configured = state.store.is_some();
    let is_ready = push_configured && store_configured;

    let response = ReadyResponse {
        status: if is_ready { "ready" } else { "not_ready" }.to_string(),
        push_configured,
        store_configured,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Prometheus exposition handler.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let Some(metrics) = &state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics disabled").into_response();
    };

    let encoder = prometheus::TextEncoder::new();
    match encoder.encode_to_string(&metrics.gather()) {
        Ok(body) => body.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
