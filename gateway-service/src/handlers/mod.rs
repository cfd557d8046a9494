pub mod auth;
pub mod proxy;
pub mod user;

pub use auth::{forgot_password, login, logout, refresh, register, reset_password};
pub use proxy::forward_to_core;
pub use user::me;
