use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::client_ip;

use super::auth::USER_ID_HEADER;
use crate::{services::ServiceError, AppState};

pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RETRY_AFTER_HEADER: &str = "x-ratelimit-retry-after-seconds";

/// Token-bucket admission per caller: `user:<id>` once the gateway has vouched
/// for the caller, `ip:<addr>` otherwise.
///
/// Must run inside [`super::identity_middleware`] so the user header is trustworthy.
pub async fn caller_rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let limits = &state.config.rate_limit;
    if !limits.enabled {
        return next.run(req).await;
    }

    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let (key, policy) = match user_id {
        Some(id) => (format!("user:{}", id), limits.authenticated_policy()),
        None => {
            let ip = client_ip(&req)
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            (format!("ip:{}", ip), limits.unauthenticated_policy())
        }
    };

    let decision = state.rate_limiter.try_consume(&key, &policy);

    if !decision.allowed {
        let retry_after = decision.retry_after.unwrap_or(policy.window);
        tracing::warn!(
            rate_key = %key,
            retry_after_secs = retry_after.as_secs(),
            "Rate limit exceeded"
        );

        let mut response =
            AppError::from(ServiceError::RateLimitExceeded { retry_after }).into_response();
        let headers = response.headers_mut();
        headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(0u32));
        headers.insert(
            RATE_LIMIT_RETRY_AFTER_HEADER,
            HeaderValue::from(retry_after.as_secs().max(1)),
        );
        return response;
    }

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(decision.remaining));
    response
}
