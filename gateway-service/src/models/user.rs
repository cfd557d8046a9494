//! User model - gateway identities with lockout bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Profile;

/// Account status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Inactive,
    Pending,
    Locked,
}

/// What kind of person the identity belongs to; drives profile lookup in the core service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    Admin,
    Staff,
    Teacher,
    Parent,
    Student,
}

impl UserType {
    /// Whether the identity must be linked to a core-service record.
    pub fn requires_reference_id(&self) -> bool {
        matches!(self, UserType::Teacher | UserType::Parent | UserType::Student)
    }

    /// Internal staff have no core-service profile.
    pub fn is_internal_staff(&self) -> bool {
        matches!(self, UserType::Admin | UserType::Staff)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Admin => "ADMIN",
            UserType::Staff => "STAFF",
            UserType::Teacher => "TEACHER",
            UserType::Parent => "PARENT",
            UserType::Student => "STUDENT",
        }
    }
}

/// Identity record.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    /// Stored lowercased.
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub status: UserStatus,
    pub user_type: UserType,
    pub reference_id: Option<i64>,
    pub roles: Vec<String>,
    pub email_verified: bool,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active && !self.deleted
    }

    /// Lock still in force at `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            roles: self.roles.clone(),
            user_type: self.user_type,
            reference_id: self.reference_id,
            profile: None,
        }
    }
}

/// Fields supplied when creating an identity; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub status: UserStatus,
    pub user_type: UserType,
    pub reference_id: Option<i64>,
    pub roles: Vec<String>,
}

impl NewUser {
    pub fn into_user(self, id: i64, now: DateTime<Utc>) -> User {
        User {
            id,
            email: self.email.trim().to_lowercase(),
            password_hash: self.password_hash,
            name: self.name,
            phone: self.phone,
            status: self.status,
            user_type: self.user_type,
            reference_id: self.reference_id,
            roles: self.roles,
            email_verified: false,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Public view of an identity returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub user_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reference_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub profile: Option<Profile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user() -> User {
        NewUser {
            email: "  Alice@X.com ".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            name: "Alice".to_string(),
            phone: None,
            status: UserStatus::Active,
            user_type: UserType::Student,
            reference_id: Some(7),
            roles: vec!["STUDENT".to_string()],
        }
        .into_user(1, Utc::now())
    }

    #[test]
    fn email_is_normalized() {
        assert_eq!(new_user().email, "alice@x.com");
    }

    #[test]
    fn lock_expires_at_boundary() {
        let now = Utc::now();
        let mut user = new_user();
        user.locked_until = Some(now + Duration::minutes(1));
        assert!(user.is_locked_at(now));
        assert!(!user.is_locked_at(now + Duration::minutes(1)));
    }

    #[test]
    fn reference_requirements_by_type() {
        assert!(UserType::Student.requires_reference_id());
        assert!(UserType::Parent.requires_reference_id());
        assert!(!UserType::Admin.requires_reference_id());
        assert!(UserType::Staff.is_internal_staff());
    }

    #[test]
    fn info_serializes_camel_case_without_profile() {
        let json = serde_json::to_value(new_user().info()).unwrap();
        assert_eq!(json["userType"], "STUDENT");
        assert_eq!(json["referenceId"], 7);
        assert!(json.get("profile").is_none());
    }
}
