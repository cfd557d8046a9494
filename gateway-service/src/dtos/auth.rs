use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::UserInfo;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 8, max = 100, message = "Password must be 8-100 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_student_details"))]
pub struct RegisterStudentRequest {
    #[validate(
        email(message = "Invalid email format"),
        length(max = 255, message = "Email must be at most 255 characters")
    )]
    pub email: String,

    #[validate(
        length(min = 8, max = 100, message = "Password must be 8-100 characters"),
        custom(function = "validate_password_strength")
    )]
    pub password: String,

    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub name: String,

    pub phone: Option<String>,

    pub date_of_birth: Option<NaiveDate>,

    pub gender: Option<String>,

    pub address: Option<String>,
}

/// Issued on login, refresh and registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

const PASSWORD_SPECIALS: &str = "@$!%*?&#";

/// At least one lowercase, uppercase, digit and special character.
fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    if has_lower && has_upper && has_digit && has_special {
        Ok(())
    } else {
        let mut err = ValidationError::new("password_strength");
        err.message = Some(
            "Password needs an uppercase letter, a lowercase letter, a digit and a special character"
                .into(),
        );
        Err(err)
    }
}

fn validate_student_details(req: &RegisterStudentRequest) -> Result<(), ValidationError> {
    if let Some(phone) = &req.phone {
        let valid = phone.len() == 10
            && phone.starts_with('0')
            && phone.chars().all(|c| c.is_ascii_digit());
        if !valid {
            let mut err = ValidationError::new("phone");
            err.message = Some("Phone must be 10 digits starting with 0".into());
            return Err(err);
        }
    }

    if let Some(gender) = &req.gender {
        if !matches!(gender.as_str(), "MALE" | "FEMALE" | "OTHER") {
            let mut err = ValidationError::new("gender");
            err.message = Some("Gender must be MALE, FEMALE or OTHER".into());
            return Err(err);
        }
    }

    if req.address.as_ref().is_some_and(|a| a.chars().count() > 1000) {
        let mut err = ValidationError::new("address");
        err.message = Some("Address must be at most 1000 characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> RegisterStudentRequest {
        RegisterStudentRequest {
            email: "student@example.com".to_string(),
            password: "Str0ng!Pass".to_string(),
            name: "Nguyen Van A".to_string(),
            phone: Some("0912345678".to_string()),
            date_of_birth: None,
            gender: Some("MALE".to_string()),
            address: None,
        }
    }

    #[test]
    fn valid_registration_passes() {
        assert!(registration().validate().is_ok());
    }

    #[test]
    fn weak_password_is_rejected() {
        let mut req = registration();
        req.password = "alllowercase1".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn malformed_phone_and_gender_are_rejected() {
        let mut req = registration();
        req.phone = Some("12345".to_string());
        assert!(req.validate().is_err());

        let mut req = registration();
        req.gender = Some("UNKNOWN".to_string());
        assert!(req.validate().is_err());
    }

    #[test]
    fn session_response_is_camel_case() {
        let body: SessionResponse = serde_json::from_value(serde_json::json!({
            "accessToken": "a",
            "refreshToken": "r",
            "tokenType": "Bearer",
            "expiresIn": 3600,
            "user": {"id": 1, "email": "a@b.com", "name": "A", "roles": [], "userType": "ADMIN"}
        }))
        .unwrap();
        assert_eq!(body.expires_in, 3600);
        assert!(body.user.profile.is_none());
    }

    #[test]
    fn reset_request_enforces_minimum_length() {
        let req: ResetPasswordRequest =
            serde_json::from_str(r#"{"token":"t","newPassword":"short"}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
