use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{models::role::join_roles, services::Claims, AppState};

/// Caller id injected for the core service once the access token checks out.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Comma-joined role codes of the caller.
pub const USER_ROLES_HEADER: &str = "x-user-roles";

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Strips client-supplied identity headers, then re-derives them from a valid access token.
///
/// Never rejects: routes that need a caller add [`require_auth`].
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    req.headers_mut().remove(USER_ID_HEADER);
    req.headers_mut().remove(USER_ROLES_HEADER);

    if let Some(token) = bearer_token(req.headers()) {
        match state.jwt.validate_access_token(&token) {
            Ok(claims) => {
                let user_id = HeaderValue::from_str(&claims.sub);
                let roles = HeaderValue::from_str(&join_roles(&claims.roles));
                match (user_id, roles) {
                    (Ok(user_id), Ok(roles)) => {
                        req.headers_mut().insert(USER_ID_HEADER, user_id);
                        req.headers_mut().insert(USER_ROLES_HEADER, roles);
                        req.extensions_mut().insert(claims);
                    }
                    _ => tracing::warn!("Access token claims are not header-safe; ignoring"),
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring invalid bearer token");
            }
        }
    }

    next.run(req).await
}

/// 401 unless [`identity_middleware`] validated an access token for this request.
pub async fn require_auth(req: Request, next: Next) -> Result<Response, AppError> {
    if req.extensions().get::<Claims>().is_none() {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Missing or invalid access token"
        )));
    }

    Ok(next.run(req).await)
}

/// Extractor for the validated claims of the caller
pub struct AuthUser(pub Claims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing or invalid access token")))?;

        Ok(AuthUser(claims.clone()))
    }
}
