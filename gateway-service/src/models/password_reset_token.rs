use chrono::{DateTime, Duration, Utc};

use super::refresh_token::hash_token;

/// Outstanding password reset request; the raw token only ever lives in the email.
#[derive(Debug, Clone, PartialEq)]
pub struct PasswordResetToken {
    pub token_hash: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl PasswordResetToken {
    pub fn new(user_id: i64, token: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token_hash: hash_token(token),
            user_id,
            expires_at: now + ttl,
            created_at: now,
            used_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }
}

/// 32 random bytes, hex encoded.
pub fn generate_reset_token() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
