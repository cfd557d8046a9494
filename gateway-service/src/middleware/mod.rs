pub mod auth;
pub mod rate_limit;

pub use auth::{identity_middleware, require_auth, AuthUser, USER_ID_HEADER, USER_ROLES_HEADER};
pub use rate_limit::{
    caller_rate_limit_middleware, RATE_LIMIT_REMAINING_HEADER, RATE_LIMIT_RETRY_AFTER_HEADER,
};
