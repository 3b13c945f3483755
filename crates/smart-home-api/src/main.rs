//! Smart Home - Security Controller API Server

use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use home_core::FileSeriesSink;
use security_engine::{EngineError, HomeEngine, RgbState, StateSnapshot};
use sensor_protocol::BroadcastTransport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod settings;
mod websocket;

use settings::Settings;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<HomeEngine>,
    /// Outbound command fan-out, also handed to the engine as its transport
    pub commands: Arc<BroadcastTransport>,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
        EngineError::InvalidArgument(_)
        | EngineError::AlarmActive(_)
        | EngineError::UnexpectedValue { .. }
        | EngineError::Protocol(_) => StatusCode::BAD_REQUEST,
        EngineError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map an engine result to a response carrying the new snapshot
fn respond(result: Result<StateSnapshot, EngineError>) -> (StatusCode, Json<ApiResponse>) {
    match result {
        Ok(snapshot) => (StatusCode::OK, Json(ApiResponse::success(snapshot))),
        Err(e) => (status_for(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

/// PIN-authenticated request
#[derive(Deserialize)]
struct PinRequest {
    #[serde(default)]
    pin: String,
}

/// Manual alarm trigger request
#[derive(Deserialize)]
struct TriggerRequest {
    #[serde(default)]
    reason: String,
}

/// People count adjustment request
#[derive(Deserialize)]
struct PeopleRequest {
    delta: i64,
}

/// RGB strip request
#[derive(Deserialize)]
struct RgbRequest {
    #[serde(default = "default_on")]
    on: bool,
    #[serde(default)]
    r: u8,
    #[serde(default)]
    g: u8,
    #[serde(default)]
    b: u8,
}

fn default_on() -> bool {
    true
}

/// Countdown request; seconds are validated by the engine
#[derive(Deserialize)]
struct TimerRequest {
    #[serde(default)]
    seconds: serde_json::Value,
}

/// Countdown increment request
#[derive(Deserialize)]
struct IncrementRequest {
    #[serde(default)]
    n_seconds: serde_json::Value,
}

/// Get the current state
async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.snapshot()))
}

/// Push sensor readings (object or array)
async fn post_events(State(state): State<AppState>, body: String) -> impl IntoResponse {
    match state.engine.ingest(&body) {
        Ok(count) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "accepted": count }))),
        ),
        Err(e) => {
            tracing::warn!("Dropping malformed payload: {}", e);
            (status_for(&e), Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Arm the system
async fn arm(State(state): State<AppState>, Json(req): Json<PinRequest>) -> impl IntoResponse {
    respond(state.engine.arm(&req.pin))
}

/// Disarm the system
async fn disarm(State(state): State<AppState>, Json(req): Json<PinRequest>) -> impl IntoResponse {
    respond(state.engine.disarm(&req.pin))
}

/// Stop an active alarm
async fn stop_alarm(
    State(state): State<AppState>,
    Json(req): Json<PinRequest>,
) -> impl IntoResponse {
    respond(state.engine.stop_alarm(&req.pin))
}

/// Raise the alarm manually
async fn trigger_alarm(
    State(state): State<AppState>,
    Json(req): Json<TriggerRequest>,
) -> impl IntoResponse {
    respond(state.engine.trigger_alarm(&req.reason))
}

/// Adjust the people count
async fn adjust_people(
    State(state): State<AppState>,
    Json(req): Json<PeopleRequest>,
) -> impl IntoResponse {
    respond(state.engine.adjust_people(req.delta))
}

/// Set the RGB strip
async fn set_rgb(State(state): State<AppState>, Json(req): Json<RgbRequest>) -> impl IntoResponse {
    respond(state.engine.set_rgb(RgbState {
        on: req.on,
        r: req.r,
        g: req.g,
        b: req.b,
    }))
}

/// Start the countdown
async fn timer_set(
    State(state): State<AppState>,
    Json(req): Json<TimerRequest>,
) -> impl IntoResponse {
    respond(state.engine.timer_set(&req.seconds))
}

/// Add the configured increment
async fn timer_add(State(state): State<AppState>) -> impl IntoResponse {
    respond(state.engine.timer_add())
}

/// Change the increment
async fn timer_add_config(
    State(state): State<AppState>,
    Json(req): Json<IncrementRequest>,
) -> impl IntoResponse {
    respond(state.engine.timer_set_increment(&req.n_seconds))
}

/// Stop the countdown
async fn timer_stop(State(state): State<AppState>) -> impl IntoResponse {
    respond(state.engine.timer_stop())
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the router
fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/state", get(get_state))
        .route("/api/events", post(post_events))
        .route("/api/alarm/arm", post(arm))
        .route("/api/alarm/disarm", post(disarm))
        .route("/api/alarm/stop", post(stop_alarm))
        .route("/api/alarm/trigger", post(trigger_alarm))
        .route("/api/people", post(adjust_people))
        .route("/api/rgb", post(set_rgb))
        .route("/api/timer/set", post(timer_set))
        .route("/api/timer/add", post(timer_add))
        .route("/api/timer/add_config", post(timer_add_config))
        .route("/api/timer/stop", post(timer_stop))
        // WebSocket
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smart_home_api=debug,security_engine=debug,info".into()),
        )
        .init();

    tracing::info!("Starting Smart Home security controller");

    let settings = Settings::load()?;
    tracing::info!("Time-series data in {}", settings.data_dir.display());

    let commands = Arc::new(BroadcastTransport::default());
    let sink = Arc::new(FileSeriesSink::spawn(settings.data_dir.clone()));
    let engine = HomeEngine::new(settings.engine_config(), commands.clone(), sink)?;
    engine.start();

    let state = AppState {
        engine: Arc::clone(&engine),
        commands,
    };
    let app = router(state);

    // Start server
    tracing::info!("Listening on http://{}", settings.bind);
    let listener = tokio::net::TcpListener::bind(&settings.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Cancelling {} scheduled tasks", engine.scheduled_tasks());
    engine.shutdown();
    Ok(())
}
