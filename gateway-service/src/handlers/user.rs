use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{middleware::AuthUser, services::ServiceError, AppState};

/// Identity of the caller, enriched with the core-service profile when available.
pub async fn me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims
        .user_id()
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid token subject")))?;

    let info = state.auth.current_user(user_id).await.map_err(|e| match e {
        // A valid token for a removed account is treated as unauthenticated.
        ServiceError::UserNotFound => {
            AppError::Unauthorized(anyhow::anyhow!("Account no longer exists"))
        }
        other => other.into(),
    })?;

    Ok(Json(info))
}
