//! HTTP surface: axum router, shared state and graceful shutdown.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{build_registry, build_retriever, PromptSettings, Settings};
use crate::http::DynHttpTransport;
use crate::normalizer::StreamNormalizer;
use crate::retrieval::DynRetriever;
use crate::session::{DynSessionStore, InMemorySessionStore};

mod agent;
mod chat;
mod error;
mod knowledge;
mod ndjson;
mod proxy;
mod rate_limit;

pub use error::ApiError;
pub use ndjson::ndjson_response;
pub use rate_limit::RateLimiter;

/// Everything a handler needs; shared behind an `Arc`.
pub struct AppState {
    pub normalizer: StreamNormalizer,
    pub sessions: DynSessionStore,
    pub retriever: DynRetriever,
    pub prompts: PromptSettings,
    /// Applied to the `/proxy` routes when set.
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

impl AppState {
    pub fn new(
        normalizer: StreamNormalizer,
        sessions: DynSessionStore,
        retriever: DynRetriever,
        prompts: PromptSettings,
    ) -> Self {
        Self {
            normalizer,
            sessions,
            retriever,
            prompts,
            rate_limiter: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(Arc::new(limiter));
        self
    }

    /// Wires the registry, session store and retriever described by `settings`.
    pub fn from_settings(settings: &Settings, transport: DynHttpTransport) -> Self {
        let registry = build_registry(settings, transport.clone());
        let normalizer = StreamNormalizer::new(Arc::new(registry))
            .with_idle_timeout(settings.stream_idle_timeout());
        let sessions: DynSessionStore = Arc::new(InMemorySessionStore::new(
            settings.session.max_pairs,
            settings.session.max_sessions,
        ));
        let state = Self::new(
            normalizer,
            sessions,
            build_retriever(settings, transport),
            settings.prompts.clone(),
        );
        if settings.rate_limit.enabled {
            state.with_rate_limiter(RateLimiter::from_settings(&settings.rate_limit))
        } else {
            state
        }
    }
}

pub fn build_app(app_state: Arc<AppState>, cors_allowed_origins: Vec<String>) -> Router {
    let proxy_routes: Router<Arc<AppState>> = Router::new()
        .route("/proxy/{provider}/stream", post(proxy::stream))
        .route("/proxy/{provider}/complete", post(proxy::complete));
    let proxy_routes = match &app_state.rate_limiter {
        Some(limiter) => proxy_routes.route_layer(axum::middleware::from_fn_with_state(
            limiter.clone(),
            rate_limit::enforce,
        )),
        None => proxy_routes,
    };

    Router::new()
        .route("/health", get(health))
        .route("/chat/complete_stream", post(chat::complete_stream))
        .merge(proxy_routes)
        .route("/agent/complete/stream", post(agent::complete_stream))
        .route("/agent/complete", post(agent::complete))
        .route("/llm/complete/stream", post(knowledge::complete_stream))
        .route("/llm/complete", post(knowledge::complete))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(cors_allowed_origins))
        .with_state(app_state)
}

/// Serves `app` until Ctrl+C (or SIGTERM on unix).
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "chatmig relay listening");
    }
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = message, "handler panicked");
    ApiError::Internal.into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

fn create_cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(AnyOrigin)
            .allow_methods(AnyOrigin)
            .allow_headers(AnyOrigin)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .into_iter()
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true)
    };

    cors.max_age(Duration::from_secs(3600))
}
