use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

/// Issued refresh token; only its hash is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshToken {
    /// `jti` claim of the signed token
    pub id: String,

    pub user_id: i64,

    /// SHA-256 hash of the signed token string
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn new(id: String, user_id: i64, token: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            token_hash: hash_token(token),
            expires_at: now + ttl,
            created_at: now,
        }
    }

    /// Expired once `now` reaches `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Hex-encoded SHA-256 of an opaque token, used as the lookup key for stored tokens.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_creation() {
        let token = RefreshToken::new("jti-1".to_string(), 42, "token_abc", Duration::days(7));

        assert_eq!(token.user_id, 42);
        assert_ne!(token.token_hash, "token_abc");
        assert_eq!(token.token_hash, hash_token("token_abc"));
        assert!(!token.is_expired());
    }

    #[test]
    fn test_refresh_token_expiry_is_inclusive() {
        let token = RefreshToken::new("jti-1".to_string(), 42, "token_abc", Duration::days(7));

        assert!(!token.is_expired_at(token.expires_at - Duration::seconds(1)));
        assert!(token.is_expired_at(token.expires_at));
    }
}
