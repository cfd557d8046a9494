use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{ForgotPasswordRequest, MessageResponse, ResetPasswordRequest},
    utils::ValidatedJson,
    AppState,
};

pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If your email is registered, you will receive a password reset link shortly.";
pub const RESET_PASSWORD_MESSAGE: &str = "Password has been reset successfully.";

/// Request a password reset link. The response never reveals whether the account exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = state.auth.forgot_password(&req.email).await {
        tracing::error!(error = %e, "Failed to process password reset request");
    }

    Ok((StatusCode::OK, Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE))))
}

/// Set a new password with a reset token
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .reset_password(&req.token, &req.new_password)
        .await?;

    Ok((StatusCode::OK, Json(MessageResponse::new(RESET_PASSWORD_MESSAGE))))
}
