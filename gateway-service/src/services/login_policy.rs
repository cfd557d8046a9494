//! Credential check with brute-force lockout.
//!
//! An identity is locked once `max_failed_attempts` consecutive failures are
//! recorded; the lock lasts `lock_duration` from the failure that triggered it.
//! Expired locks are cleared lazily on the next attempt, together with the counter.
//!
//! The lock is decided on the record as read inside the store's atomic update, so
//! a correct password racing with the failure that locks the account is refused.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, OnceLock};

use super::credentials::CredentialStore;
use super::error::ServiceError;
use crate::models::User;
use crate::utils::{Password, PasswordHasher};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockoutConfig {
    pub max_failed_attempts: u32,
    pub lock_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lock_duration: Duration::minutes(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Locked { until: DateTime<Utc> },
    Failed { locked: bool },
    Succeeded,
}

pub struct LoginPolicy {
    credentials: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    config: LockoutConfig,
}

impl LoginPolicy {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        config: LockoutConfig,
    ) -> Self {
        Self {
            credentials,
            hasher,
            config,
        }
    }

    pub async fn authenticate(&self, email: &str, password: &Password) -> Result<User, ServiceError> {
        let user = self
            .credentials
            .find_active_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let now = Utc::now();
        if let Some(until) = user.locked_until.filter(|until| *until > now) {
            return Err(locked(user.id, until, now));
        }

        if !user.is_active() {
            tracing::info!(user_id = %user.id, status = ?user.status, "Login rejected: account inactive");
            return Err(ServiceError::AccountInactive);
        }

        let matched = self.hasher.verify(password, &user.password_hash)?;
        let config = self.config;

        let outcome = Arc::new(OnceLock::new());
        let slot = Arc::clone(&outcome);
        let updated = self
            .credentials
            .update(
                user.id,
                Box::new(move |record: &mut User| {
                    let _ = slot.set(apply_attempt(record, matched, now, &config));
                }),
            )
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let outcome = outcome
            .get()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Login attempt was not applied to user {}", user.id))?;

        match outcome {
            AttemptOutcome::Succeeded => {
                tracing::info!(user_id = %updated.id, "User authenticated");
                Ok(updated)
            }
            AttemptOutcome::Locked { until } => Err(locked(updated.id, until, now)),
            AttemptOutcome::Failed { locked: true } => {
                tracing::warn!(
                    user_id = %updated.id,
                    attempts = updated.failed_login_attempts,
                    "Account locked after repeated failed logins"
                );
                Err(ServiceError::InvalidCredentials)
            }
            AttemptOutcome::Failed { locked: false } => {
                tracing::info!(
                    user_id = %updated.id,
                    attempts = updated.failed_login_attempts,
                    "Failed login attempt"
                );
                Err(ServiceError::InvalidCredentials)
            }
        }
    }
}

fn locked(user_id: i64, until: DateTime<Utc>, now: DateTime<Utc>) -> ServiceError {
    tracing::info!(user_id = %user_id, "Login rejected: account locked");
    ServiceError::AccountLocked {
        remaining: (until - now).to_std().unwrap_or_default(),
    }
}

/// Applied to the freshly read record inside the store's atomic update.
/// A live lock leaves the record untouched, whatever the password.
fn apply_attempt(
    user: &mut User,
    matched: bool,
    now: DateTime<Utc>,
    config: &LockoutConfig,
) -> AttemptOutcome {
    if let Some(until) = user.locked_until {
        if until > now {
            return AttemptOutcome::Locked { until };
        }
        user.locked_until = None;
        user.failed_login_attempts = 0;
    }

    if matched {
        user.failed_login_attempts = 0;
        user.last_login_at = Some(now);
        AttemptOutcome::Succeeded
    } else {
        user.failed_login_attempts = user.failed_login_attempts.saturating_add(1);
        let locked = user.failed_login_attempts >= config.max_failed_attempts;
        if locked {
            user.locked_until = Some(now + config.lock_duration);
        }
        AttemptOutcome::Failed { locked }
    }
}
