pub mod password;
pub mod validation;

pub use password::{Argon2Hasher, Password, PasswordHasher};
pub use validation::ValidatedJson;
