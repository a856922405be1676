use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Request, State,
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::engine::{
    dispatcher::Dispatcher,
    error::EngineError,
    metrics::MetricsRegistry,
    models::{ExecutionRequest, ExecutionResult},
};

#[derive(Debug, Clone, Copy)]
pub struct AdmissionLimits {
    pub max_code_bytes: usize,
    pub max_test_cases: usize,
}

#[derive(Clone)]
pub struct AppState {
    dispatcher: Dispatcher,
    metrics: Arc<MetricsRegistry>,
    admission: AdmissionLimits,
}

pub fn routes(
    dispatcher: Dispatcher,
    metrics_registry: Arc<MetricsRegistry>,
    admission: AdmissionLimits,
) -> Router {
    let state = AppState {
        dispatcher,
        metrics: metrics_registry,
        admission,
    };
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/execute", post(execute))
        .route("/execute-manual", post(execute))
        .route("/ws", get(websocket))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics.render_prometheus())
}

async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Json<ExecutionResult>, EngineError> {
    let Json(request) = payload?;
    validate_request(&state.admission, &request)?;
    tracing::info!(
        language = %request.language,
        code_bytes = request.code.len(),
        "execution requested"
    );
    Ok(Json(state.dispatcher.execute(request).await))
}

async fn websocket(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: AppState) {
    while let Some(message) = socket.recv().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                tracing::debug!(error = %err, "websocket read failed");
                break;
            }
        };

        let reply = match serde_json::from_str::<ExecutionRequest>(text.as_str()) {
            Ok(request) => match validate_request(&state.admission, &request) {
                Ok(()) => {
                    let result = state.dispatcher.execute(request).await;
                    serde_json::to_string(&result).unwrap_or_else(|err| {
                        tracing::error!(error = %err, "failed to encode result");
                        error_reply("Failed to marshal result")
                    })
                }
                Err(err) => error_reply(&err.to_string()),
            },
            Err(err) => {
                tracing::debug!(error = %err, "websocket payload is not a request");
                error_reply("Invalid JSON format")
            }
        };

        if let Err(err) = socket.send(Message::Text(reply.into())).await {
            tracing::debug!(error = %err, "websocket write failed");
            break;
        }
    }
}

fn error_reply(message: &str) -> String {
    serde_json::json!({ "status": "Error", "error": message }).to_string()
}

fn validate_request(
    admission: &AdmissionLimits,
    request: &ExecutionRequest,
) -> Result<(), EngineError> {
    if request.code.len() > admission.max_code_bytes {
        return Err(EngineError::InvalidRequest(format!(
            "code too large; max is {} bytes",
            admission.max_code_bytes
        )));
    }
    // Only caller-supplied cases are capped. Stored sets come from the
    // operator's problem database and are judged in full.
    let cases = request.test_cases.as_ref().map(Vec::len).unwrap_or(0);
    if cases > admission.max_test_cases {
        return Err(EngineError::InvalidRequest(format!(
            "too many test cases; max is {}",
            admission.max_test_cases
        )));
    }
    Ok(())
}

async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}
