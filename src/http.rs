//! # HTTP Transport
//!
//! Axum router exposing `POST /identify` and `GET /health`.
//!
//! The engine sits behind one async mutex, so identify calls are serialized
//! end to end; each call runs on the blocking pool while holding the guard.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::DEFAULT_BODY_LIMIT;
use crate::error::IdentifyError;
use crate::Unicontact;

const INTERNAL_ERROR: &str = "Internal server error";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<Unicontact>>,
    pub body_limit: usize,
}

impl AppState {
    pub fn new(engine: Unicontact) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }
}

const INVALID_PHONE: &str = "phoneNumber must be a string or a non-negative integer";

/// Phone numbers are accepted as JSON strings or non-negative integers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PhoneField {
    Text(String),
    Number(serde_json::Number),
}

impl PhoneField {
    /// Digits as sent; `None` for fractional, exponent or negative numbers.
    pub fn into_string(self) -> Option<String> {
        match self {
            PhoneField::Text(text) => Some(text),
            PhoneField::Number(number) => number.as_u64().map(|digits| digits.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    #[serde(default)]
    pub phone_number: Option<PhoneField>,
    #[serde(default)]
    pub email: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/identify", post(identify_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    serve_on(listener, state).await
}

pub async fn serve_on(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

pub async fn identify_handler(
    State(state): State<AppState>,
    payload: Result<Json<IdentifyRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return api_error(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let phone_number = match request.phone_number.map(PhoneField::into_string) {
        Some(None) => return api_error(StatusCode::BAD_REQUEST, INVALID_PHONE),
        Some(Some(phone)) => Some(phone),
        None => None,
    };
    let email = request.email;

    let mut engine = state.engine.clone().lock_owned().await;
    let result =
        tokio::task::spawn_blocking(move || engine.identify(phone_number, email)).await;

    match result {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(Err(err)) => identify_error_response(&err),
        Err(join_err) => {
            error!(error = %join_err, "identify task failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let contacts = state.engine.lock().await.contact_count();
    let body = serde_json::json!({
        "status": "ok",
        "contacts": contacts,
    });
    (StatusCode::OK, Json(body))
}

fn identify_error_response(err: &IdentifyError) -> Response {
    if err.is_client_error() {
        return api_error(StatusCode::BAD_REQUEST, err.to_string());
    }
    error!(error = %err, "error in /identify");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
}

pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, Json(body)).into_response()
}
