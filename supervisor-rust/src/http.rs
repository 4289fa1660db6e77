//! # http
//!
//! Status and control surface.
//!
//! | Route              | Purpose                                      |
//! |--------------------|----------------------------------------------|
//! | `GET /health`      | liveness                                     |
//! | `GET /status`      | latest [`StatusReport`](crate::StatusReport) |
//! | `PUT /parameters`  | replace the recovery policy at runtime       |

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::SupervisorParams;
use crate::runtime::{Command, SharedStatus};
use crate::supervisor::StatusReport;

#[derive(Clone)]
pub struct AppState {
    pub status: SharedStatus,
    pub commands: mpsc::Sender<Command>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(code: StatusCode, msg: impl ToString) -> ApiError {
    (code, Json(json!({ "error": msg.to_string() })))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status(State(app): State<AppState>) -> Result<Json<StatusReport>, ApiError> {
    app.status
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "supervisor not started"))
}

async fn update_parameters(
    State(app): State<AppState>,
    Json(params): Json<SupervisorParams>,
) -> Result<Json<SupervisorParams>, ApiError> {
    params
        .validate()
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    let (reply, rx) = oneshot::channel();
    app.commands
        .send(Command::UpdateParameters { params, reply })
        .await
        .map_err(|_| api_error(StatusCode::SERVICE_UNAVAILABLE, "supervisor stopped"))?;

    match rx.await {
        Ok(Ok(())) => Ok(Json(params)),
        Ok(Err(e)) => Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, e)),
        Err(_) => Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "supervisor stopped")),
    }
}

pub fn router(state: AppState) -> Router {
    // CORS: any origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/parameters", put(update_parameters))
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` flips.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("🚀 Status API on http://{addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}
