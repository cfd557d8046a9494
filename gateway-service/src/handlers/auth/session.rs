use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{LoginRequest, LogoutRequest, RefreshRequest},
    utils::ValidatedJson,
    AppState,
};

/// Login with email and password
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.auth.login(&req.email, &req.password).await?;
    Ok((StatusCode::OK, Json(session)))
}

/// Exchange a refresh token for a new access/refresh pair
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.auth.refresh(&req.refresh_token).await?;
    Ok((StatusCode::OK, Json(session)))
}

/// Revoke a refresh token. Unknown tokens are not an error.
pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> impl IntoResponse {
    if let Err(e) = state.auth.logout(&req.refresh_token).await {
        tracing::error!(error = %e, "Failed to revoke refresh token on logout");
    }
    StatusCode::NO_CONTENT
}
