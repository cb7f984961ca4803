//! HTTP gateway for SurveyChat.
//!
//! Exposes the survey endpoints that relay a participant's chat to the
//! completion API, plus a health check. Every response, including errors
//! and preflights, carries the configured cross-origin headers.
//!
//! Built on Axum.

mod api;
pub mod error;

use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use surveychat_config::{AppConfig, CorsConfig};
use surveychat_core::assembler::ConversationAssembler;
use surveychat_core::error::Error;
use surveychat_core::provider::{CompletionBackend, FileStore};
use surveychat_core::relay::Relay;
use surveychat_providers::OpenAiResponsesProvider;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ApiError;

/// Shared application state, immutable after startup.
pub struct GatewayState {
    pub relay: Relay,
    pub chat: ConversationAssembler,
    pub pdf_start: ConversationAssembler,
    pub pdf_turn: ConversationAssembler,
    pub default_model: String,
    pub opening_prompt: String,
    pub cors: CorsConfig,
    pub max_upload_bytes: usize,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(
        config: &AppConfig,
        backend: Arc<dyn CompletionBackend>,
        store: Arc<dyn FileStore>,
    ) -> Self {
        Self {
            relay: Relay::new(
                backend,
                store,
                config.request_timeout(),
                config.upload_purpose.clone(),
            ),
            chat: ConversationAssembler::new((&config.prompts.chat).into()),
            pdf_start: ConversationAssembler::new((&config.prompts.pdf_start).into()),
            pdf_turn: ConversationAssembler::new((&config.prompts.pdf_turn).into()),
            default_model: config.default_model.clone(),
            opening_prompt: config.prompts.opening_prompt.clone(),
            cors: config.cors.clone(),
            max_upload_bytes: config.gateway.max_upload_bytes,
        }
    }
}

/// Build the router with all gateway routes.
///
/// Layers, outermost first:
/// - HTTP trace logging, one span per request with a generated id
/// - Cross-origin headers and preflight answers
/// - Panic capture (JSON 500)
/// - Request body size limit
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route(
            "/api/chat",
            post(api::chat).fallback(api::method_not_allowed),
        )
        .route(
            "/api/pdf-start",
            post(api::pdf_start).fallback(api::method_not_allowed),
        )
        .route(
            "/api/pdf-turn",
            post(api::pdf_turn).fallback(api::method_not_allowed),
        )
        .route(
            "/health",
            get(api::health).fallback(api::method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            cors_middleware,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "request",
                    id = %uuid::Uuid::new_v4(),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    if !config.has_api_key() {
        warn!("No API key configured; upstream calls will be rejected");
    }

    let provider = Arc::new(OpenAiResponsesProvider::from_config(&config)?);
    let state = Arc::new(GatewayState::new(&config, provider.clone(), provider));
    let app = build_router(state);

    info!(
        addr = %addr,
        model = %config.default_model,
        allow_all_origins = config.cors.allow_all,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// --- Cross-origin policy ---

/// Answers preflights with an empty 204 and stamps the cross-origin headers
/// on every response.
async fn cors_middleware(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    apply_cors_headers(
        response.headers_mut(),
        state.cors.allow_origin_for(origin.as_deref()),
    );
    response
}

fn apply_cors_headers(headers: &mut HeaderMap, allow_origin: &str) {
    match HeaderValue::from_str(allow_origin) {
        Ok(value) => {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        Err(_) => warn!(origin = %allow_origin, "Allowed origin is not a valid header value"),
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("600"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
}

fn panic_response(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let reason = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".into());
    ApiError::from(Error::Internal(reason)).into_response()
}
