use service_core::error::AppError;
use std::time::Duration;
use thiserror::Error;

use super::downstream::DownstreamError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is locked")]
    AccountLocked { remaining: Duration },

    #[error("Account is not active")]
    AccountInactive,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Downstream service unavailable: {0}")]
    DownstreamUnavailable(String),

    #[error("Downstream resource not found")]
    DownstreamNotFound,

    #[error("Downstream service rejected the request with status {0}")]
    DownstreamRejected(u16),

    #[error("{0}")]
    ValidationError(String),

    #[error("Invalid password reset token")]
    ResetTokenInvalid,

    #[error("Password reset token expired")]
    ResetTokenExpired,

    #[error("Password reset token already used")]
    ResetTokenUsed,

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("Registration failed")]
    RegistrationFailed,

    #[error("User not found")]
    UserNotFound,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<DownstreamError> for ServiceError {
    fn from(err: DownstreamError) -> Self {
        match err {
            DownstreamError::NotFound => ServiceError::DownstreamNotFound,
            DownstreamError::Rejected { status } => ServiceError::DownstreamRejected(status),
            DownstreamError::MissingReference(user_type) => ServiceError::ValidationError(
                format!("{} account is not linked to a profile", user_type.as_str()),
            ),
            e @ (DownstreamError::CircuitOpen(_)
            | DownstreamError::Timeout(_)
            | DownstreamError::Unavailable(_)
            | DownstreamError::Decode(_)) => ServiceError::DownstreamUnavailable(e.to_string()),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::AccountLocked { remaining } => {
                let minutes = remaining.as_secs().div_ceil(60).max(1);
                AppError::Forbidden(anyhow::anyhow!(
                    "Account is locked. Try again in {} minute(s)",
                    minutes
                ))
            }
            ServiceError::AccountInactive => {
                AppError::Forbidden(anyhow::anyhow!("Account is not active"))
            }
            ServiceError::InvalidRefreshToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid refresh token"))
            }
            ServiceError::RefreshTokenExpired => {
                AppError::Unauthorized(anyhow::anyhow!("Refresh token expired"))
            }
            ServiceError::RateLimitExceeded { retry_after } => AppError::TooManyRequests(
                "Rate limit exceeded. Please try again later.".to_string(),
                Some(retry_after.as_secs().max(1)),
            ),
            ServiceError::DownstreamUnavailable(detail) => {
                tracing::warn!(error = %detail, "Downstream unavailable");
                AppError::ServiceUnavailable(
                    "Downstream service is temporarily unavailable".to_string(),
                )
            }
            ServiceError::DownstreamNotFound => {
                AppError::NotFound(anyhow::anyhow!("Resource not found"))
            }
            ServiceError::DownstreamRejected(status) => {
                AppError::BadGateway(format!("downstream responded with status {}", status))
            }
            ServiceError::ValidationError(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::ResetTokenInvalid => {
                AppError::BadRequest(anyhow::anyhow!("Invalid password reset token"))
            }
            ServiceError::ResetTokenExpired => {
                AppError::BadRequest(anyhow::anyhow!("Password reset token expired"))
            }
            ServiceError::ResetTokenUsed => {
                AppError::BadRequest(anyhow::anyhow!("Password reset token already used"))
            }
            ServiceError::EmailAlreadyExists => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::RegistrationFailed => {
                AppError::InternalError(anyhow::anyhow!("Student registration failed"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
