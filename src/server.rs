//! HTTP chat server.
//!
//! Exposes the chat pipeline over JSON so a web or chat front end can
//! supply the transcript and render the reply. There is no session store:
//! every request carries the full conversation.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Reply to a transcript |
//! | `GET`  | `/products` | List loaded products and their status |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "timeout", "message": "reply not ready after 30s" } }
//! ```
//!
//! Error codes: `bad_request` (400), `timeout` (408). Generation failures
//! are not errors at this level: they arrive as fallback reply text.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::ConversationTurn;
use crate::orchestrator::ChatOrchestrator;

/// Shared state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<ChatOrchestrator>,
    default_product: Arc<str>,
    reply_timeout: Option<Duration>,
}

/// Build the router without binding. Used by [`run_server`] and tests.
pub fn router(config: &Config, orchestrator: Arc<ChatOrchestrator>) -> Router {
    let state = AppState {
        orchestrator,
        default_product: Arc::from(config.retrieval.default_product.as_str()),
        reply_timeout: config.server.reply_timeout_secs.map(Duration::from_secs),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/products", get(handle_products))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config, orchestrator: Arc<ChatOrchestrator>) -> anyhow::Result<()> {
    let app = router(config, orchestrator);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("chat server listening on http://{}", config.server.bind);
    println!("Chat server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout",
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /products ============

#[derive(Serialize)]
struct ProductInfo {
    key: String,
    status: String,
    fragments: usize,
    vectors: usize,
}

#[derive(Serialize)]
struct ProductListResponse {
    default_product: String,
    products: Vec<ProductInfo>,
}

async fn handle_products(State(state): State<AppState>) -> Json<ProductListResponse> {
    let catalog = state.orchestrator.catalog();
    let products = catalog
        .product_keys()
        .filter_map(|key| {
            catalog.product(key).map(|index| ProductInfo {
                key: key.to_string(),
                status: index.status().as_str().to_string(),
                fragments: index.fragments().len(),
                vectors: index.vector_count(),
            })
        })
        .collect();

    Json(ProductListResponse {
        default_product: state.default_product.to_string(),
        products,
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    messages: Vec<ConversationTurn>,
    #[serde(default)]
    product: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    product: String,
}

/// Reply to the supplied transcript.
///
/// The product defaults to `[retrieval].default_product`. When
/// `reply_timeout_secs` is set, a reply that takes longer is abandoned with
/// `408`.
async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let product = match request.product {
        Some(p) if p.trim().is_empty() => return Err(bad_request("product must not be empty")),
        Some(p) => p,
        None => state.default_product.to_string(),
    };

    let reply = state.orchestrator.reply(&request.messages, &product);
    let reply = match state.reply_timeout {
        Some(limit) => match tokio::time::timeout(limit, reply).await {
            Ok(text) => text,
            Err(_) => {
                warn!("reply for {} exceeded {:?}", product, limit);
                return Err(timeout_error(format!(
                    "reply not ready after {}s",
                    limit.as_secs()
                )));
            }
        },
        None => reply.await,
    };

    Ok(Json(ChatResponse { reply, product }))
}
