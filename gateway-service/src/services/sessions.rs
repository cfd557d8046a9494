//! Refresh-token and password-reset-token persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::models::{PasswordResetToken, RefreshToken};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, token: RefreshToken) -> Result<(), anyhow::Error>;

    /// Remove and return the record in one step; a second caller gets `None`.
    async fn take_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, anyhow::Error>;

    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, anyhow::Error>;

    async fn delete_by_user(&self, user_id: i64) -> Result<usize, anyhow::Error>;
}

#[async_trait]
pub trait PasswordResetStore: Send + Sync {
    /// Drop every outstanding token of the identity, then store this one.
    async fn replace_for_user(&self, token: PasswordResetToken) -> Result<(), anyhow::Error>;

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, anyhow::Error>;

    async fn delete_by_hash(&self, token_hash: &str) -> Result<(), anyhow::Error>;

    /// Compare-and-set on `used_at`: `true` only for the caller that flipped it.
    async fn mark_used(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool, anyhow::Error>;
}

/// Refresh tokens keyed by hash.
#[derive(Default)]
pub struct InMemorySessionStore {
    tokens: DashMap<String, RefreshToken>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, token: RefreshToken) -> Result<(), anyhow::Error> {
        self.tokens.insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn take_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, anyhow::Error> {
        Ok(self.tokens.remove(token_hash).map(|(_, token)| token))
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, anyhow::Error> {
        Ok(self.tokens.remove(token_hash).is_some())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<usize, anyhow::Error> {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| token.user_id != user_id);
        Ok(before.saturating_sub(self.tokens.len()))
    }
}

#[derive(Default)]
pub struct InMemoryPasswordResetStore {
    tokens: DashMap<String, PasswordResetToken>,
}

impl InMemoryPasswordResetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_for_user(&self, user_id: i64) -> usize {
        self.tokens
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl PasswordResetStore for InMemoryPasswordResetStore {
    async fn replace_for_user(&self, token: PasswordResetToken) -> Result<(), anyhow::Error> {
        self.tokens.retain(|_, existing| existing.user_id != token.user_id);
        self.tokens.insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, anyhow::Error> {
        Ok(self.tokens.get(token_hash).map(|entry| entry.value().clone()))
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<(), anyhow::Error> {
        self.tokens.remove(token_hash);
        Ok(())
    }

    async fn mark_used(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool, anyhow::Error> {
        match self.tokens.get_mut(token_hash) {
            Some(mut entry) if entry.used_at.is_none() => {
                entry.used_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
