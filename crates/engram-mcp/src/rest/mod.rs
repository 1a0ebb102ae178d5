//! REST Surface
//!
//! Versioned JSON API under `/api/v1`, served by axum. Handlers decode into
//! the engine's option structs, pass through the shared router for rate
//! limiting, and map error kinds onto status codes.

mod handlers;

use std::net::SocketAddr;

use axum::Router;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tracing::info;

use engram_core::EngineError;

use crate::router::AppContext;

/// Build the `/api/v1` router.
pub fn router(ctx: AppContext, cors: bool) -> Router {
    let v1 = Router::new()
        .route(
            "/memories",
            get(handlers::list_memories).post(handlers::create_memory),
        )
        .route(
            "/memories/{id}",
            get(handlers::get_memory)
                .put(handlers::update_memory)
                .delete(handlers::delete_memory),
        )
        .route("/memories/search", post(handlers::search_memories))
        .route("/stats", get(handlers::stats))
        .route("/health", get(handlers::health))
        .route("/domains", get(handlers::list_domains))
        .route("/domains/{name}/stats", get(handlers::domain_stats))
        .route("/categories", get(handlers::list_categories))
        .route("/sessions", get(handlers::list_sessions))
        .route(
            "/relationships",
            get(handlers::list_relationships).post(handlers::create_relationship),
        )
        .route(
            "/relationships/discover",
            post(handlers::discover_relationships),
        )
        .with_state(ctx);

    let app = Router::new().nest("/api/v1", v1);
    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Bind and serve until the process shuts down.
pub async fn serve(ctx: AppContext, host: &str, port: u16) -> std::io::Result<()> {
    let cors = ctx.engine.config.rest_api.cors;
    let app = router(ctx, cors);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local: SocketAddr = listener.local_addr()?;
    info!("REST API listening on http://{}", local);
    axum::serve(listener, app).await
}

/// Engine error adapted to an HTTP response
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, retry_after) = match &self.0 {
            EngineError::BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, None),
            EngineError::RateLimited { retry_after, .. } => {
                (StatusCode::TOO_MANY_REQUESTS, Some(*retry_after))
            }
            EngineError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
            // Client closed request, as popularized by nginx
            EngineError::Cancelled => (
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                None,
            ),
            EngineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let body = axum::Json(serde_json::json!({
            "error": { "message": self.0.to_string() }
        }));

        let mut response = (status, body).into_response();
        if let Some(wait) = retry_after {
            let seconds = wait.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

// ============================================================================
// TESTS
// ============================================================================
