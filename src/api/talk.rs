//! Talk mode control endpoints

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::talk::{Activation, TalkRuntime, TalkStatus};

/// Build talk control router
pub fn router(runtime: TalkRuntime) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/on", post(enable))
        .route("/off", post(disable))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/wake/on", post(enable_wake))
        .route("/wake/off", post(disable_wake))
        .with_state(runtime)
}

async fn status(State(runtime): State<TalkRuntime>) -> Json<TalkStatus> {
    Json(runtime.status())
}

async fn enable(State(runtime): State<TalkRuntime>) -> Json<TalkStatus> {
    Json(runtime.enable(Activation::Manual))
}

async fn disable(State(runtime): State<TalkRuntime>) -> Json<TalkStatus> {
    Json(runtime.disable())
}

async fn pause(State(runtime): State<TalkRuntime>) -> Result<Json<TalkStatus>, TalkApiError> {
    Ok(Json(runtime.pause()?))
}

async fn resume(State(runtime): State<TalkRuntime>) -> Result<Json<TalkStatus>, TalkApiError> {
    Ok(Json(runtime.resume()?))
}

async fn enable_wake(State(runtime): State<TalkRuntime>) -> Json<TalkStatus> {
    Json(runtime.enable_wake())
}

async fn disable_wake(State(runtime): State<TalkRuntime>) -> Json<TalkStatus> {
    Json(runtime.disable_wake())
}

/// Talk control API errors
#[derive(Debug)]
pub enum TalkApiError {
    /// Request not valid in the current state
    Conflict(String),
    Internal(String),
}

impl From<crate::Error> for TalkApiError {
    fn from(e: crate::Error) -> Self {
        match e {
            crate::Error::Control(msg) => Self::Conflict(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for TalkApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::Conflict(msg) => (StatusCode::CONFLICT, "invalid_state", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}
