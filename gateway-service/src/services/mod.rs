//! Services layer for the gateway.
//!
//! Credential checks, token issuance and rotation, password reset,
//! student registration, owner bootstrap and the guarded client for the core service.

pub mod auth;
pub mod bootstrap;
pub mod credentials;
pub mod downstream;
pub mod email;
pub mod error;
pub mod jwt;
pub mod login_policy;
pub mod sessions;

pub use auth::{AuthDependencies, AuthSessionService};
pub use bootstrap::ensure_owner;
pub use credentials::{CredentialStore, DuplicateEmail, InMemoryCredentialStore};
pub use downstream::{
    CoreRequest, CoreResponse, CoreServiceClient, DownstreamError, DownstreamGateway,
    HttpCoreClient, CORE_SERVICE,
};
pub use email::{EmailProvider, EmailService, LoggingEmailProvider, MockEmailService};
pub use error::ServiceError;
pub use jwt::{Claims, JwtService, TokenKind};
pub use login_policy::{LockoutConfig, LoginPolicy};
pub use sessions::{
    InMemoryPasswordResetStore, InMemorySessionStore, PasswordResetStore, SessionStore,
};
