//! HTTP surface over [`TodoStore`](crate::store::TodoStore).
//!
//! Every list-scoped route lives under `/api/lists/:list_id`. Failures are
//! returned as the serialized [`AppError`] with a status derived from its kind.

use std::future::Future;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::state::AppState;
use crate::{AppError, ErrorKind};

mod handlers;

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidMove | ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::TransactionConflict => StatusCode::CONFLICT,
        ErrorKind::Network | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(self.kind());
        if status.is_server_error() {
            error!(target: "todolist", event = "api_error", status = status.as_u16(), error = %self);
        } else {
            debug!(target: "todolist", event = "api_rejected", status = status.as_u16(), code = %self.code());
        }
        (status, Json(self)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/lists/:list_id/todos",
            get(handlers::list_todos).post(handlers::create_todo),
        )
        .route("/lists/:list_id/todos/move", post(handlers::move_todo))
        .route(
            "/lists/:list_id/todos/:todo_id",
            get(handlers::get_todo)
                .patch(handlers::update_todo)
                .delete(handlers::delete_todo),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), api_delay));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn api_delay(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(delay) = state.api_delay {
        tokio::time::sleep(delay).await;
    }
    next.run(request).await
}

/// Serves the router on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(
        target: "todolist",
        event = "server_listening",
        addr = %addr,
        api_delay_ms = state.api_delay.map(|d| d.as_millis() as u64).unwrap_or(0)
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!(target: "todolist", event = "server_stopped");
    Ok(())
}
