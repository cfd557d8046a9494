use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use std::sync::Arc;

use crate::{
    dtos::auth::{RegisterStudentRequest, SessionResponse},
    models::{
        password_reset_token::generate_reset_token, refresh_token::hash_token,
        CreateStudentRequest, NewUser, PasswordResetToken, Profile, RefreshToken, Role, User,
        UserInfo, UserStatus, UserType,
    },
    services::{
        credentials::{CredentialStore, DuplicateEmail},
        downstream::DownstreamGateway,
        email::EmailProvider,
        jwt::JwtService,
        login_policy::LoginPolicy,
        sessions::{PasswordResetStore, SessionStore},
        ServiceError,
    },
    utils::{Password, PasswordHasher},
};

/// Storage and collaborators used by [`AuthSessionService`].
#[derive(Clone)]
pub struct AuthDependencies {
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub reset_tokens: Arc<dyn PasswordResetStore>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub email: Arc<dyn EmailProvider>,
    pub downstream: Arc<DownstreamGateway>,
    pub jwt: JwtService,
}

pub struct AuthSessionService {
    deps: AuthDependencies,
    policy: LoginPolicy,
    reset_token_ttl: Duration,
    frontend_url: String,
}

impl AuthSessionService {
    pub fn new(
        deps: AuthDependencies,
        policy: LoginPolicy,
        reset_token_ttl: Duration,
        frontend_url: String,
    ) -> Self {
        Self {
            deps,
            policy,
            reset_token_ttl,
            frontend_url,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.deps.jwt
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionResponse, ServiceError> {
        let user = self
            .policy
            .authenticate(email, &Password::new(password.to_string()))
            .await?;

        let profile = self.enrich(&user).await;
        let session = self.issue_session(&user, profile).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(session)
    }

    /// Rotate: the presented token is consumed whether or not a new pair is issued.
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionResponse, ServiceError> {
        let token_hash = hash_token(refresh_token);

        if let Err(e) = self.deps.jwt.validate_refresh_token(refresh_token) {
            if !matches!(e.kind(), ErrorKind::ExpiredSignature) {
                return Err(ServiceError::InvalidRefreshToken);
            }
            // Genuine but expired: purge the record if it is still stored.
            return if self.deps.sessions.delete_by_hash(&token_hash).await? {
                tracing::info!("Expired refresh token presented");
                Err(ServiceError::RefreshTokenExpired)
            } else {
                Err(ServiceError::InvalidRefreshToken)
            };
        }

        let stored = self
            .deps
            .sessions
            .take_by_hash(&token_hash)
            .await?
            .ok_or(ServiceError::InvalidRefreshToken)?;

        if stored.is_expired() {
            tracing::info!(user_id = %stored.user_id, "Expired refresh token presented");
            return Err(ServiceError::RefreshTokenExpired);
        }

        let user = match self.deps.credentials.find_by_id(stored.user_id).await {
            Ok(Some(user)) if user.is_active() => user,
            Ok(_) => return Err(ServiceError::AccountInactive),
            Err(e) => {
                self.restore(stored).await;
                return Err(e.into());
            }
        };

        let profile = self.enrich(&user).await;
        match self.issue_session(&user, profile).await {
            Ok(session) => {
                tracing::info!(user_id = %user.id, "Refresh token rotated");
                Ok(session)
            }
            Err(e) => {
                self.restore(stored).await;
                Err(e)
            }
        }
    }

    /// Idempotent; the token is not validated first.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ServiceError> {
        let removed = self
            .deps
            .sessions
            .delete_by_hash(&hash_token(refresh_token))
            .await?;

        tracing::info!(removed, "Logout");
        Ok(())
    }

    /// Always Ok for the caller; unknown accounts and email failures are only logged.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ServiceError> {
        let user = match self.deps.credentials.find_active_by_email(email).await? {
            Some(user) if user.is_active() => user,
            Some(user) => {
                tracing::info!(user_id = %user.id, "Password reset requested for inactive account");
                return Ok(());
            }
            None => {
                tracing::info!("Password reset requested for unknown email");
                return Ok(());
            }
        };

        let token = generate_reset_token();
        self.deps
            .reset_tokens
            .replace_for_user(PasswordResetToken::new(user.id, &token, self.reset_token_ttl))
            .await?;

        if let Err(e) = self
            .deps
            .email
            .send_password_reset_email(&user.email, &token, &self.frontend_url)
            .await
        {
            tracing::error!(user_id = %user.id, error = %e, "Failed to send password reset email");
        } else {
            tracing::info!(user_id = %user.id, "Password reset email sent");
        }

        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ServiceError> {
        let token_hash = hash_token(token);
        let reset = self
            .deps
            .reset_tokens
            .find_by_hash(&token_hash)
            .await?
            .ok_or(ServiceError::ResetTokenInvalid)?;

        let now = Utc::now();
        if reset.is_expired_at(now) {
            self.deps.reset_tokens.delete_by_hash(&token_hash).await?;
            return Err(ServiceError::ResetTokenExpired);
        }

        if reset.is_used() {
            return Err(ServiceError::ResetTokenUsed);
        }

        match self.deps.credentials.find_by_id(reset.user_id).await? {
            Some(user) if !user.deleted => {}
            _ => return Err(ServiceError::UserNotFound),
        }

        let password_hash = self
            .deps
            .hasher
            .hash(&Password::new(new_password.to_string()))?;

        // Claim the token before touching the password; only one caller wins.
        if !self.deps.reset_tokens.mark_used(&token_hash, now).await? {
            return Err(ServiceError::ResetTokenUsed);
        }

        self.deps
            .credentials
            .update(
                reset.user_id,
                Box::new(move |user: &mut User| {
                    user.password_hash = password_hash;
                    user.failed_login_attempts = 0;
                    user.locked_until = None;
                }),
            )
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let revoked = self.deps.sessions.delete_by_user(reset.user_id).await?;

        tracing::info!(user_id = %reset.user_id, revoked_sessions = revoked, "Password reset");
        Ok(())
    }

    /// Create the identity, then the core-service student; undo the identity if the second step fails.
    pub async fn register_student(
        &self,
        req: RegisterStudentRequest,
    ) -> Result<SessionResponse, ServiceError> {
        let email = req.email.trim().to_lowercase();
        if self.deps.credentials.email_exists(&email).await? {
            return Err(ServiceError::EmailAlreadyExists);
        }

        let password_hash = self
            .deps
            .hasher
            .hash(&Password::new(req.password.clone()))?;

        let user = self
            .deps
            .credentials
            .insert(NewUser {
                email: email.clone(),
                password_hash,
                name: req.name.clone(),
                phone: req.phone.clone(),
                status: UserStatus::Active,
                user_type: UserType::Student,
                reference_id: None,
                roles: vec![Role::STUDENT.to_string()],
            })
            .await
            .map_err(|e| {
                if e.downcast_ref::<DuplicateEmail>().is_some() {
                    ServiceError::EmailAlreadyExists
                } else {
                    ServiceError::Internal(e)
                }
            })?;

        let student = match self
            .deps
            .downstream
            .create_student(&CreateStudentRequest {
                name: req.name,
                email,
                phone: req.phone,
                date_of_birth: req.date_of_birth,
                gender: req.gender,
                address: req.address,
            })
            .await
        {
            Ok(student) => student,
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Student creation failed; rolling back identity");
                self.compensate(user.id).await;
                return Err(ServiceError::RegistrationFailed);
            }
        };

        let student_id = student.id;
        let linked = self
            .deps
            .credentials
            .update(
                user.id,
                Box::new(move |u: &mut User| u.reference_id = Some(student_id)),
            )
            .await;

        let user = match linked {
            Ok(Some(user)) => user,
            Ok(None) | Err(_) => {
                tracing::error!(user_id = %user.id, student_id, "Failed to link identity to student");
                self.compensate(user.id).await;
                return Err(ServiceError::RegistrationFailed);
            }
        };

        let session = self
            .issue_session(&user, Some(Profile::Student(student)))
            .await?;

        tracing::info!(user_id = %user.id, student_id, "Student registered");
        Ok(session)
    }

    pub async fn current_user(&self, user_id: i64) -> Result<UserInfo, ServiceError> {
        let user = self
            .deps
            .credentials
            .find_by_id(user_id)
            .await?
            .filter(|user| !user.deleted)
            .ok_or(ServiceError::UserNotFound)?;

        let mut info = user.info();
        info.profile = self.enrich(&user).await;
        Ok(info)
    }

    async fn issue_session(
        &self,
        user: &User,
        profile: Option<Profile>,
    ) -> Result<SessionResponse, ServiceError> {
        let access_token = self
            .deps
            .jwt
            .generate_access_token(user.id, &user.email, &user.roles)?;
        let (refresh_token, jti) = self.deps.jwt.generate_refresh_token(user.id)?;

        self.deps
            .sessions
            .insert(RefreshToken::new(
                jti,
                user.id,
                &refresh_token,
                self.deps.jwt.refresh_token_ttl(),
            ))
            .await?;

        let mut info = user.info();
        info.profile = profile;

        Ok(SessionResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.deps.jwt.access_token_expiry_seconds(),
            user: info,
        })
    }

    /// Profile lookup never fails the caller.
    async fn enrich(&self, user: &User) -> Option<Profile> {
        match self
            .deps
            .downstream
            .fetch_profile(user.user_type, user.reference_id)
            .await
        {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Profile enrichment skipped");
                None
            }
        }
    }

    async fn restore(&self, token: RefreshToken) {
        let user_id = token.user_id;
        if let Err(e) = self.deps.sessions.insert(token).await {
            tracing::error!(user_id = %user_id, error = %e, "Failed to restore refresh token");
        }
    }

    async fn compensate(&self, user_id: i64) {
        if let Err(e) = self.deps.credentials.soft_delete(user_id).await {
            tracing::error!(user_id = %user_id, error = %e, "Registration compensation failed");
        }
    }
}
