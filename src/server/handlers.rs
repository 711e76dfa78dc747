use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::info;

use super::ServerHandle;
use super::models::{
    AcceptedResponse, ErrorResponse, SettingsResponse, StateQuery, StateResponse,
};
use super::state::{self, ServerState};
use crate::reader::{Command, OptionsPatch};

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(handle: ServerHandle, addr: String) -> Result<()> {
    let app = router(handle.state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address: {}", addr))?;
    info!("serving on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(reader_state))
        .route("/frame", get(frame))
        .route("/start", post(start))
        .route("/pause", post(pause))
        .route("/reset", post(reset))
        .route("/settings", post(update_settings))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

async fn reader_state(
    State(state): State<ServerState>,
    Query(query): Query<StateQuery>,
) -> Json<StateResponse> {
    let snapshot = state::read(&state.snapshot);
    let frame_base64 = if query.with_frame.unwrap_or(false) {
        snapshot
            .frame_png
            .as_ref()
            .map(|png| BASE64.encode(png.as_slice()))
    } else {
        None
    };
    Json(StateResponse {
        status: snapshot.status,
        cursor: snapshot.cursor,
        page_count: snapshot.page_count,
        phrase: snapshot.phrase.clone(),
        translation: snapshot.translation.clone(),
        options: snapshot.options,
        frame_base64,
    })
}

async fn frame(State(state): State<ServerState>) -> Result<impl IntoResponse, ApiError> {
    let png = state::read(&state.snapshot)
        .frame_png
        .clone()
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "no frame rendered yet"))?;
    Ok((
        [(header::CONTENT_TYPE, "image/png")],
        png.as_ref().clone(),
    ))
}

fn send(
    state: &ServerState,
    command: Command,
    name: &'static str,
) -> Result<Json<AcceptedResponse>, ApiError> {
    state
        .commands
        .send(command)
        .map_err(|_| error(StatusCode::SERVICE_UNAVAILABLE, "reader is no longer running"))?;
    Ok(Json(AcceptedResponse { accepted: name }))
}

async fn start(State(state): State<ServerState>) -> Result<Json<AcceptedResponse>, ApiError> {
    send(&state, Command::Start, "start")
}

async fn pause(State(state): State<ServerState>) -> Result<Json<AcceptedResponse>, ApiError> {
    send(&state, Command::TogglePause, "pause")
}

async fn reset(State(state): State<ServerState>) -> Result<Json<AcceptedResponse>, ApiError> {
    send(&state, Command::Reset, "reset")
}

async fn update_settings(
    State(state): State<ServerState>,
    Json(patch): Json<OptionsPatch>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let options = {
        let mut snapshot = state::write(&state.snapshot);
        let next = snapshot
            .options
            .apply(&patch)
            .map_err(|err| error(StatusCode::BAD_REQUEST, err.to_string()))?;
        next.validate()
            .map_err(|err| error(StatusCode::BAD_REQUEST, err.to_string()))?;
        snapshot.options = next;
        next
    };
    send(&state, Command::Configure(options), "settings")?;
    Ok(Json(SettingsResponse { options }))
}
