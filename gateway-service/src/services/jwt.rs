use chrono::{Duration, Utc};
use jsonwebtoken::errors::{Error as TokenError, ErrorKind};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::fs;
use uuid::Uuid;

use crate::config::JwtConfig;

/// Which flow a token was minted for; carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims shared by access and refresh tokens. Refresh tokens leave `email` and `roles` empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// JWT ID; for refresh tokens it matches the stored record
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, anyhow::Error> {
        self.sub
            .parse()
            .map_err(|_| anyhow::anyhow!("Token subject is not a user id"))
    }
}

/// JWT service for token generation and validation
#[derive(Clone)]
pub struct JwtService {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_seconds: i64,
    refresh_token_expiry_seconds: i64,
}

impl JwtService {
    /// RS256 when a key pair is configured, HS512 from the shared secret otherwise.
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        match (&config.private_key_path, &config.public_key_path) {
            (Some(private_key_path), Some(public_key_path)) => {
                let private_key_pem = fs::read_to_string(private_key_path).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to read private key from {}: {}",
                        private_key_path,
                        e
                    )
                })?;
                let public_key_pem = fs::read_to_string(public_key_path).map_err(|e| {
                    anyhow::anyhow!("Failed to read public key from {}: {}", public_key_path, e)
                })?;

                Self::from_rsa_pem(
                    private_key_pem.as_bytes(),
                    public_key_pem.as_bytes(),
                    config.access_token_expiry_seconds,
                    config.refresh_token_expiry_seconds,
                )
            }
            _ => {
                let secret = config
                    .secret
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("JWT_SECRET is not configured"))?;

                Ok(Self::from_secret(
                    secret.expose_secret().as_bytes(),
                    config.access_token_expiry_seconds,
                    config.refresh_token_expiry_seconds,
                ))
            }
        }
    }

    pub fn from_secret(
        secret: &[u8],
        access_token_expiry_seconds: i64,
        refresh_token_expiry_seconds: i64,
    ) -> Self {
        tracing::info!("JWT service initialized with HS512 secret");

        Self {
            algorithm: Algorithm::HS512,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_token_expiry_seconds,
            refresh_token_expiry_seconds,
        }
    }

    pub fn from_rsa_pem(
        private_key_pem: &[u8],
        public_key_pem: &[u8],
        access_token_expiry_seconds: i64,
        refresh_token_expiry_seconds: i64,
    ) -> Result<Self, anyhow::Error> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

        tracing::info!("JWT service initialized with RS256 keys");

        Ok(Self {
            algorithm: Algorithm::RS256,
            encoding_key,
            decoding_key,
            access_token_expiry_seconds,
            refresh_token_expiry_seconds,
        })
    }

    /// Generate an access token for a user
    pub fn generate_access_token(
        &self,
        user_id: i64,
        email: &str,
        roles: &[String],
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_token_expiry_seconds);

        let claims = Claims {
            sub: user_id.to_string(),
            email: Some(email.to_string()),
            roles: roles.to_vec(),
            kind: TokenKind::Access,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Generate a refresh token; returns the token and its `jti`.
    pub fn generate_refresh_token(&self, user_id: i64) -> Result<(String, String), anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.refresh_token_expiry_seconds);
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user_id.to_string(),
            email: None,
            roles: Vec::new(),
            kind: TokenKind::Refresh,
            jti: jti.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))?;

        Ok((token, jti))
    }

    /// Check signature and expiry (no leeway), and the kind when one is required.
    ///
    /// The signature is verified before expiry, so `ErrorKind::ExpiredSignature`
    /// means a genuine token whose lifetime is over.
    pub fn validate(&self, token: &str, expected: Option<TokenKind>) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;

        if let Some(kind) = expected {
            if claims.kind != kind {
                tracing::debug!(expected = ?kind, actual = ?claims.kind, "Token kind mismatch");
                return Err(ErrorKind::InvalidToken.into());
            }
        }

        Ok(claims)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate(token, Some(TokenKind::Access))
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate(token, Some(TokenKind::Refresh))
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_seconds
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_token_expiry_seconds)
    }
}
