//! Identity persistence.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use thiserror::Error;

use crate::models::{NewUser, User};

/// Raised by [`CredentialStore::insert`] when a live identity already owns the email.
#[derive(Debug, Error)]
#[error("Email already registered")]
pub struct DuplicateEmail;

/// Mutation applied by [`CredentialStore::update`].
pub type UserMutation = Box<dyn FnOnce(&mut User) + Send>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Case-insensitive lookup among non-deleted identities.
    async fn find_active_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, anyhow::Error>;

    async fn email_exists(&self, email: &str) -> Result<bool, anyhow::Error>;

    /// Fails with [`DuplicateEmail`] when a non-deleted identity has the same email.
    async fn insert(&self, user: NewUser) -> Result<User, anyhow::Error>;

    /// Atomic read-modify-write of one identity. `None` when the id is unknown.
    async fn update(&self, id: i64, mutation: UserMutation) -> Result<Option<User>, anyhow::Error>;

    async fn soft_delete(&self, id: i64) -> Result<(), anyhow::Error>;
}

/// In-process store. Each record sits behind its map shard lock, so `update` is atomic per identity.
pub struct InMemoryCredentialStore {
    users: DashMap<i64, User>,
    next_id: AtomicI64,
    // serialises email uniqueness check + insert
    insert_lock: Mutex<()>,
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicI64::new(1),
            insert_lock: Mutex::new(()),
        }
    }

    fn find_live(&self, email: &str) -> Option<User> {
        let email = email.trim().to_lowercase();
        self.users
            .iter()
            .find(|entry| !entry.deleted && entry.email == email)
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_active_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error> {
        Ok(self.find_live(email))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, anyhow::Error> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, anyhow::Error> {
        Ok(self.find_live(email).is_some())
    }

    async fn insert(&self, user: NewUser) -> Result<User, anyhow::Error> {
        let _guard = self
            .insert_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Credential store lock poisoned"))?;

        if self.find_live(&user.email).is_some() {
            return Err(DuplicateEmail.into());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let user = user.into_user(id, Utc::now());
        self.users.insert(id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: i64, mutation: UserMutation) -> Result<Option<User>, anyhow::Error> {
        match self.users.get_mut(&id) {
            Some(mut entry) => {
                mutation(entry.value_mut());
                entry.updated_at = Utc::now();
                Ok(Some(entry.value().clone()))
            }
            None => Ok(None),
        }
    }

    async fn soft_delete(&self, id: i64) -> Result<(), anyhow::Error> {
        if let Some(mut entry) = self.users.get_mut(&id) {
            let now = Utc::now();
            entry.deleted = true;
            entry.deleted_at = Some(now);
            entry.updated_at = now;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UserStatus, UserType};
    use std::sync::Arc;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            name: "Test".to_string(),
            phone: None,
            status: UserStatus::Active,
            user_type: UserType::Staff,
            reference_id: None,
            roles: vec!["STAFF".to_string()],
        }
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let store = InMemoryCredentialStore::new();
        store.insert(new_user("Mixed@Case.com")).await.unwrap();

        let found = store.find_active_by_email("MIXED@case.COM").await.unwrap();
        assert_eq!(found.unwrap().email, "mixed@case.com");
        assert!(store.email_exists("mixed@case.com").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryCredentialStore::new();
        store.insert(new_user("a@b.com")).await.unwrap();

        let err = store.insert(new_user("A@B.com")).await.unwrap_err();
        assert!(err.downcast_ref::<DuplicateEmail>().is_some());
    }

    #[tokio::test]
    async fn soft_deleted_identity_is_invisible_and_frees_email() {
        let store = InMemoryCredentialStore::new();
        let user = store.insert(new_user("a@b.com")).await.unwrap();
        store.soft_delete(user.id).await.unwrap();

        assert!(store.find_active_by_email("a@b.com").await.unwrap().is_none());
        assert!(!store.email_exists("a@b.com").await.unwrap());
        assert!(store.find_by_id(user.id).await.unwrap().unwrap().deleted);

        let again = store.insert(new_user("a@b.com")).await.unwrap();
        assert_ne!(again.id, user.id);
    }

    #[tokio::test]
    async fn update_unknown_id_returns_none() {
        let store = InMemoryCredentialStore::new();
        let result = store.update(99, Box::new(|u| u.name = "x".to_string())).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_do_not_lose_increments() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let user = store.insert(new_user("a@b.com")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(user.id, Box::new(|u| u.failed_login_attempts += 1))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 50);
    }
}
