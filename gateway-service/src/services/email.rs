use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use service_core::axum::async_trait;
use service_core::error::AppError;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::EmailConfig;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Result<Self, AppError> {
        let (Some(host), Some(user), Some(password)) =
            (&config.smtp_host, &config.smtp_user, &config.smtp_password)
        else {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SMTP_HOST, SMTP_USER and SMTP_PASSWORD must all be set"
            )));
        };

        let creds = Credentials::new(user.clone(), password.expose_secret().clone());

        let mailer = SmtpTransport::starttls_relay(host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(smtp_host = %host, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: &str,
        html_body: &str,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from_email.parse().map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?)
            .to(to_email.parse().map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        // SmtpTransport is blocking
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, subject = %subject, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

fn reset_link(base_url: &str, reset_token: &str) -> String {
    format!(
        "{}/reset-password?token={}",
        base_url.trim_end_matches('/'),
        reset_token
    )
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), AppError> {
        let link = reset_link(base_url, reset_token);

        let html_body = format!(
            r###"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Password Reset Request</h2>
        <p>We received a request to reset your password. Click the link below to set a new password:</p>
        <p>
            <a href="{}" style="background-color: #2196F3; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">
                Reset Password
            </a>
        </p>
        <p style="color: #666; font-size: 12px;">
            This link will expire in 1 hour. If you didn't request this, please ignore this email.
        </p>
    </body>
</html>
"###,
            link
        );

        let plain_body = format!(
            "Password Reset Request\n\nWe received a request to reset your password. Visit the following link to set a new password:\n\n{}\n\nThis link will expire in 1 hour. If you didn't request this, please ignore this email.",
            link
        );

        self.send_email(to_email, "Reset Your Password", &plain_body, &html_body)
            .await
    }
}

/// Development provider: logs that a reset email would have gone out.
#[derive(Clone, Default)]
pub struct LoggingEmailProvider;

#[async_trait]
impl EmailProvider for LoggingEmailProvider {
    async fn send_password_reset_email(
        &self,
        _to_email: &str,
        _reset_token: &str,
        base_url: &str,
    ) -> Result<(), AppError> {
        tracing::info!(
            frontend_url = %base_url,
            "SMTP not configured; password reset email not delivered"
        );
        Ok(())
    }
}

/// Test double that records every reset email and can be told to fail.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// `(recipient, raw token)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        _base_url: &str,
    ) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::EmailError("mock SMTP failure".to_string()));
        }

        self.sent
            .lock()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("Mock email lock poisoned")))?
            .push((to_email.to_string(), reset_token.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_user: Some("mailer@example.com".to_string()),
            smtp_password: Some(Secret::new("app-password".to_string())),
            from: "no-reply@example.com".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn test_email_service_creation() {
        assert!(EmailService::new(&config()).is_ok());
    }

    #[test]
    fn test_email_service_requires_smtp_settings() {
        let mut config = config();
        config.smtp_password = None;
        assert!(EmailService::new(&config).is_err());
    }

    #[test]
    fn test_reset_link_format() {
        assert_eq!(
            reset_link("http://app.local/", "abc"),
            "http://app.local/reset-password?token=abc"
        );
    }

    #[tokio::test]
    async fn test_mock_records_sends() {
        let mock = MockEmailService::new();
        mock.send_password_reset_email("a@b.com", "tok", "http://x")
            .await
            .unwrap();
        assert_eq!(mock.sent(), vec![("a@b.com".to_string(), "tok".to_string())]);

        let failing = MockEmailService::failing();
        assert!(failing
            .send_password_reset_email("a@b.com", "tok", "http://x")
            .await
            .is_err());
    }
}
