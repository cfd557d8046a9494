//! First-run seeding of the owner account.

use crate::{
    models::{NewUser, Role, User, UserStatus, UserType},
    services::credentials::{CredentialStore, DuplicateEmail},
    utils::{Password, PasswordHasher},
};

/// Create the owner identity unless the email is already taken. Returns the new record.
pub async fn ensure_owner(
    credentials: &dyn CredentialStore,
    hasher: &dyn PasswordHasher,
    email: &str,
    password: &Password,
    name: &str,
) -> Result<Option<User>, anyhow::Error> {
    if credentials.email_exists(email).await? {
        tracing::debug!("Owner account already present; skipping bootstrap");
        return Ok(None);
    }

    let owner = NewUser {
        email: email.to_string(),
        password_hash: hasher.hash(password)?,
        name: name.to_string(),
        phone: None,
        status: UserStatus::Active,
        user_type: UserType::Admin,
        reference_id: None,
        roles: vec![Role::OWNER.to_string(), Role::ADMIN.to_string()],
    };

    match credentials.insert(owner).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "Bootstrap owner account created");
            Ok(Some(user))
        }
        // lost a race with a concurrent insert
        Err(e) if e.downcast_ref::<DuplicateEmail>().is_some() => Ok(None),
        Err(e) => Err(e),
    }
}
