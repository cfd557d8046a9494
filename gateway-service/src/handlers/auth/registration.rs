use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{dtos::auth::RegisterStudentRequest, utils::ValidatedJson, AppState};

/// Self-service student sign-up. Creates the identity and the core-service student together.
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.auth.register_student(req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}
