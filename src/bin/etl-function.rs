/// ETL function host - HTTP endpoint that runs one invocation per request
///
/// The function comes from the route (`/invoke/:function`) or from
/// `DFA_FUNCTION_NAME` (`/invoke`). The request body is the invocation body:
/// an object-store event for `file`/`file_to_ts`, a connector-hub delivery for
/// `stream_to_ts`, ignored for stream pulls.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use identity_etl::{
    Database, DieselOffsetStore, DieselWarehouse, EtlConfig, Function, HandlerCause,
    HandlerError, Handlers, InvocationResponse, JetStreamReader, LocalObjectStore, OffsetTracker,
};

struct AppState {
    config: EtlConfig,
    objects: LocalObjectStore,
    stream: JetStreamReader,
    tracker: OffsetTracker<DieselOffsetStore>,
    database: Database,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = serve().await {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

async fn serve() -> Result<(), String> {
    let config = EtlConfig::from_env().map_err(|e| e.to_string())?;
    let database = Database::connect(&config).map_err(|e| e.to_string())?;

    // Connect to NATS JetStream
    let stream = JetStreamReader::connect(config.nats.clone())
        .await
        .map_err(|e| format!("Failed to connect to NATS: {}", e))?;

    let state = Arc::new(AppState {
        objects: LocalObjectStore::new(&config.object_store_root),
        tracker: OffsetTracker::new(DieselOffsetStore::new(database.pool().clone(), &config.schema)),
        stream,
        database,
        config,
    });

    let app = Router::new()
        .route("/invoke", post(invoke_configured))
        .route("/invoke/:function", post(invoke_function))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("ETL function host listening on {}", addr);
    tracing::info!("Reading from NATS stream: {}", state.config.nats.stream_name);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;
    axum::serve(listener, app).await.map_err(|e| e.to_string())
}

fn parse_body(body: &str) -> Result<Value, AppError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| AppError::ValidationError(format!("Invalid JSON: {}", e)))
}

async fn run(
    state: &AppState,
    function: Function,
    body: Value,
) -> Result<Json<InvocationResponse>, AppError> {
    let handlers = Handlers::new(&state.config, &state.objects, &state.stream, &state.tracker);
    let mut warehouse = DieselWarehouse::from_database(&state.database);
    let response = handlers.dispatch(function, &body, &mut warehouse).await?;
    Ok(Json(response))
}

/// Run the function named in the route
async fn invoke_function(
    State(state): State<Arc<AppState>>,
    Path(function): Path<String>,
    body: String,
) -> Result<Json<InvocationResponse>, AppError> {
    let function = function
        .parse::<Function>()
        .map_err(|e| AppError::NotFound(e.to_string()))?;
    run(&state, function, parse_body(&body)?).await
}

/// Run the function named by DFA_FUNCTION_NAME
async fn invoke_configured(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<InvocationResponse>, AppError> {
    let function = state
        .config
        .require_function_name()
        .and_then(|name| name.parse::<Function>())
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    run(&state, function, parse_body(&body)?).await
}

/// Health check endpoint (liveness)
async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "etl-function",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint - verifies NATS and warehouse connectivity
async fn readiness_check(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StatusCode> {
    if !state.stream.is_connected() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    if let Err(e) = state.database.test_connection() {
        tracing::warn!("Warehouse not reachable: {}", e);
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(serde_json::json!({
        "status": "ready",
        "service": "etl-function",
        "nats": "connected",
        "warehouse": "connected"
    })))
}

// Error handling

#[derive(Debug)]
enum AppError {
    ValidationError(String),
    NotFound(String),
    InternalError(String),
    Handler(HandlerError),
}

impl From<HandlerError> for AppError {
    fn from(e: HandlerError) -> Self {
        AppError::Handler(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            AppError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({ "error": msg }))
            }
            AppError::Handler(e) => {
                let status = match &e.cause {
                    HandlerCause::Precondition(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let stage = e.stage().map(|s| s.to_string());
                (status, serde_json::json!({ "error": e.to_string(), "stage": stage }))
            }
        };

        (status, Json(body)).into_response()
    }
}
