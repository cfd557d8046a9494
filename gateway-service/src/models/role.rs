//! Role codes embedded into access tokens.

use serde::{Deserialize, Serialize};

/// Role catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub code: String,
    pub name: String,
}

impl Role {
    pub const OWNER: &'static str = "OWNER";
    pub const ADMIN: &'static str = "ADMIN";
    pub const TEACHER: &'static str = "TEACHER";
    pub const STAFF: &'static str = "STAFF";
    pub const PARENT: &'static str = "PARENT";
    pub const STUDENT: &'static str = "STUDENT";

    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }

    /// Built-in roles.
    pub fn defaults() -> Vec<Role> {
        vec![
            Role::new(Self::OWNER, "Owner"),
            Role::new(Self::ADMIN, "Administrator"),
            Role::new(Self::TEACHER, "Teacher"),
            Role::new(Self::STAFF, "Staff"),
            Role::new(Self::PARENT, "Parent"),
            Role::new(Self::STUDENT, "Student"),
        ]
    }
}

/// Header form of a role list: `ADMIN,TEACHER`.
pub fn join_roles(roles: &[String]) -> String {
    roles.join(",")
}
