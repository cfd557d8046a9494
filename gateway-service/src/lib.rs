pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get, post},
    Json, Router,
};
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use service_core::resilience::TokenBucketLimiter;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::services::{AuthSessionService, DownstreamGateway, HttpCoreClient, JwtService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub auth: Arc<AuthSessionService>,
    pub jwt: JwtService,
    pub downstream: Arc<DownstreamGateway>,
    pub rate_limiter: Arc<TokenBucketLimiter>,
    /// Raw transport used by the `/api/*` pass-through.
    pub core_client: HttpCoreClient,
}

pub fn build_router(state: AppState) -> Router {
    let limits = &state.config.rate_limit;

    let forgot_limiter =
        create_ip_rate_limiter(limits.password_reset_attempts, limits.password_reset_window_seconds);
    let reset_limiter =
        create_ip_rate_limiter(limits.password_reset_attempts, limits.password_reset_window_seconds);
    let register_limiter =
        create_ip_rate_limiter(limits.register_attempts, limits.register_window_seconds);

    let forgot_route = Router::new()
        .route("/auth/forgot-password", post(handlers::forgot_password))
        .layer(from_fn_with_state(forgot_limiter, ip_rate_limit_middleware));

    let reset_route = Router::new()
        .route("/auth/reset-password", post(handlers::reset_password))
        .layer(from_fn_with_state(reset_limiter, ip_rate_limit_middleware));

    let register_route = Router::new()
        .route("/auth/register", post(handlers::register))
        .layer(from_fn_with_state(register_limiter, ip_rate_limit_middleware));

    let protected = Router::new()
        .route("/auth/me", get(handlers::me))
        .route("/api/*path", any(handlers::forward_to_core))
        .layer(from_fn(middleware::require_auth));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/logout", post(handlers::logout))
        .merge(forgot_route)
        .merge(reset_route)
        .merge(register_route)
        .merge(protected)
        // Caller-identity token bucket; needs the identity headers set below
        .layer(from_fn_with_state(
            state.clone(),
            middleware::caller_rate_limit_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::identity_middleware,
        ))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");

            tracing::info_span!(
                "http_request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
            )
        }))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([
            HeaderName::from_static(middleware::RATE_LIMIT_REMAINING_HEADER),
            HeaderName::from_static(middleware::RATE_LIMIT_RETRY_AFTER_HEADER),
            HeaderName::from_static("x-request-id"),
        ])
}

/// Liveness plus the state of each downstream circuit.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let circuits: serde_json::Map<String, serde_json::Value> = state
        .downstream
        .breakers()
        .states()
        .into_iter()
        .map(|(name, circuit)| (name, serde_json::Value::String(circuit.to_string())))
        .collect();

    Json(serde_json::json!({
        "status": "ok",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "circuits": circuits,
    }))
}
