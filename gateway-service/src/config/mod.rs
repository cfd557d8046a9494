use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::resilience::{CircuitBreakerConfig, RateLimitPolicy, RetryConfig};
use std::env;
use std::time::Duration;

/// Minimum HS512 secret length in bytes.
pub const MIN_HS512_SECRET_BYTES: usize = 64;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub jwt: JwtConfig,
    pub login: LoginConfig,
    pub rate_limit: RateLimitConfig,
    pub downstream: DownstreamConfig,
    pub email: EmailConfig,
    pub security: SecurityConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS512 signing secret, used when no RSA key pair is configured.
    pub secret: Option<Secret<String>>,
    pub private_key_path: Option<String>,
    pub public_key_path: Option<String>,
    pub access_token_expiry_seconds: i64,
    pub refresh_token_expiry_seconds: i64,
}

impl JwtConfig {
    pub fn uses_rsa(&self) -> bool {
        self.private_key_path.is_some() && self.public_key_path.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub max_failed_attempts: u32,
    pub lock_duration_minutes: i64,
    pub password_reset_token_expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub unauthenticated_limit: u32,
    pub authenticated_limit: u32,
    pub window_seconds: u64,
    pub password_reset_attempts: u32,
    pub password_reset_window_seconds: u64,
    pub register_attempts: u32,
    pub register_window_seconds: u64,
}

impl RateLimitConfig {
    pub fn unauthenticated_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(
            self.unauthenticated_limit,
            Duration::from_secs(self.window_seconds),
        )
    }

    pub fn authenticated_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(
            self.authenticated_limit,
            Duration::from_secs(self.window_seconds),
        )
    }
}

#[derive(Debug, Clone)]
pub struct DownstreamConfig {
    pub core_service_url: String,
    pub circuit_breaker_window_size: usize,
    pub circuit_breaker_failure_rate_threshold: f64,
    pub circuit_breaker_minimum_calls: usize,
    pub circuit_breaker_open_seconds: u64,
    pub circuit_breaker_half_open_calls: u32,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl DownstreamConfig {
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            window_size: self.circuit_breaker_window_size,
            failure_rate_threshold: self.circuit_breaker_failure_rate_threshold,
            minimum_calls: self.circuit_breaker_minimum_calls,
            open_duration: Duration::from_secs(self.circuit_breaker_open_seconds),
            half_open_max_calls: self.circuit_breaker_half_open_calls,
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::fixed(
            self.max_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<Secret<String>>,
    pub from: String,
    pub frontend_url: String,
}

impl EmailConfig {
    pub fn smtp_configured(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_user.is_some() && self.smtp_password.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

/// Optional first account, created at startup when no identity holds its email.
#[derive(Debug, Clone, Default)]
pub struct BootstrapConfig {
    pub owner_email: Option<String>,
    pub owner_password: Option<Secret<String>>,
    pub owner_name: String,
}

impl BootstrapConfig {
    pub fn owner(&self) -> Option<(&str, &Secret<String>)> {
        match (&self.owner_email, &self.owner_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password)),
            _ => None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_source(common, &|key: &str| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_source(
        common: core_config::Config,
        source: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let env_str = source("ENVIRONMENT").unwrap_or_else(|| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let get = |key: &str, default: Option<&str>| get_env(source, key, default, is_prod);

        let config = GatewayConfig {
            common,
            environment: environment.clone(),
            service_name: get("SERVICE_NAME", Some("gateway-service"))?,
            service_version: get("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get("LOG_LEVEL", Some("info"))?,
            jwt: JwtConfig {
                secret: get_optional_env(source, "JWT_SECRET").map(Secret::new),
                private_key_path: get_optional_env(source, "JWT_PRIVATE_KEY_PATH"),
                public_key_path: get_optional_env(source, "JWT_PUBLIC_KEY_PATH"),
                access_token_expiry_seconds: parse(
                    "JWT_ACCESS_TOKEN_EXPIRY_SECONDS",
                    get("JWT_ACCESS_TOKEN_EXPIRY_SECONDS", Some("3600"))?,
                )?,
                refresh_token_expiry_seconds: parse(
                    "JWT_REFRESH_TOKEN_EXPIRY_SECONDS",
                    get("JWT_REFRESH_TOKEN_EXPIRY_SECONDS", Some("604800"))?,
                )?,
            },
            login: LoginConfig {
                max_failed_attempts: parse(
                    "LOGIN_MAX_FAILED_ATTEMPTS",
                    get("LOGIN_MAX_FAILED_ATTEMPTS", Some("5"))?,
                )?,
                lock_duration_minutes: parse(
                    "LOGIN_LOCK_DURATION_MINUTES",
                    get("LOGIN_LOCK_DURATION_MINUTES", Some("30"))?,
                )?,
                password_reset_token_expiry_minutes: parse(
                    "PASSWORD_RESET_TOKEN_EXPIRY_MINUTES",
                    get("PASSWORD_RESET_TOKEN_EXPIRY_MINUTES", Some("60"))?,
                )?,
            },
            rate_limit: RateLimitConfig {
                enabled: parse("RATE_LIMIT_ENABLED", get("RATE_LIMIT_ENABLED", Some("true"))?)?,
                unauthenticated_limit: parse(
                    "RATE_LIMIT_UNAUTHENTICATED",
                    get("RATE_LIMIT_UNAUTHENTICATED", Some("100"))?,
                )?,
                authenticated_limit: parse(
                    "RATE_LIMIT_AUTHENTICATED",
                    get("RATE_LIMIT_AUTHENTICATED", Some("1000"))?,
                )?,
                window_seconds: parse(
                    "RATE_LIMIT_WINDOW_SECONDS",
                    get("RATE_LIMIT_WINDOW_SECONDS", Some("60"))?,
                )?,
                password_reset_attempts: parse(
                    "RATE_LIMIT_PASSWORD_RESET_ATTEMPTS",
                    get("RATE_LIMIT_PASSWORD_RESET_ATTEMPTS", Some("5"))?,
                )?,
                password_reset_window_seconds: parse(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    get("RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS", Some("3600"))?,
                )?,
                register_attempts: parse(
                    "RATE_LIMIT_REGISTER_ATTEMPTS",
                    get("RATE_LIMIT_REGISTER_ATTEMPTS", Some("5"))?,
                )?,
                register_window_seconds: parse(
                    "RATE_LIMIT_REGISTER_WINDOW_SECONDS",
                    get("RATE_LIMIT_REGISTER_WINDOW_SECONDS", Some("3600"))?,
                )?,
            },
            downstream: DownstreamConfig {
                core_service_url: get("CORE_SERVICE_URL", Some("http://localhost:8081"))?
                    .trim_end_matches('/')
                    .to_string(),
                circuit_breaker_window_size: parse(
                    "CIRCUIT_BREAKER_WINDOW_SIZE",
                    get("CIRCUIT_BREAKER_WINDOW_SIZE", Some("10"))?,
                )?,
                circuit_breaker_failure_rate_threshold: parse(
                    "CIRCUIT_BREAKER_FAILURE_RATE_THRESHOLD",
                    get("CIRCUIT_BREAKER_FAILURE_RATE_THRESHOLD", Some("50"))?,
                )?,
                circuit_breaker_minimum_calls: parse(
                    "CIRCUIT_BREAKER_MINIMUM_CALLS",
                    get("CIRCUIT_BREAKER_MINIMUM_CALLS", Some("5"))?,
                )?,
                circuit_breaker_open_seconds: parse(
                    "CIRCUIT_BREAKER_OPEN_SECONDS",
                    get("CIRCUIT_BREAKER_OPEN_SECONDS", Some("30"))?,
                )?,
                circuit_breaker_half_open_calls: parse(
                    "CIRCUIT_BREAKER_HALF_OPEN_CALLS",
                    get("CIRCUIT_BREAKER_HALF_OPEN_CALLS", Some("3"))?,
                )?,
                timeout_seconds: parse(
                    "DOWNSTREAM_TIMEOUT_SECONDS",
                    get("DOWNSTREAM_TIMEOUT_SECONDS", Some("10"))?,
                )?,
                max_retries: parse(
                    "DOWNSTREAM_MAX_RETRIES",
                    get("DOWNSTREAM_MAX_RETRIES", Some("2"))?,
                )?,
                retry_backoff_ms: parse(
                    "DOWNSTREAM_RETRY_BACKOFF_MS",
                    get("DOWNSTREAM_RETRY_BACKOFF_MS", Some("1000"))?,
                )?,
            },
            email: EmailConfig {
                smtp_host: get_optional_env(source, "SMTP_HOST"),
                smtp_user: get_optional_env(source, "SMTP_USER"),
                smtp_password: get_optional_env(source, "SMTP_PASSWORD").map(Secret::new),
                from: get("EMAIL_FROM", Some("no-reply@localhost"))?,
                frontend_url: get("FRONTEND_URL", Some("http://localhost:3000"))?,
            },
            security: SecurityConfig {
                allowed_origins: get("ALLOWED_ORIGINS", Some("http://localhost:3000"))?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            bootstrap: BootstrapConfig {
                owner_email: get_optional_env(source, "BOOTSTRAP_OWNER_EMAIL"),
                owner_password: get_optional_env(source, "BOOTSTRAP_OWNER_PASSWORD").map(Secret::new),
                owner_name: source("BOOTSTRAP_OWNER_NAME").unwrap_or_else(|| "Owner".to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Prod
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        if self.jwt.access_token_expiry_seconds <= 0 {
            return Err(config_error(
                "JWT_ACCESS_TOKEN_EXPIRY_SECONDS must be positive",
            ));
        }

        if self.jwt.refresh_token_expiry_seconds <= 0 {
            return Err(config_error(
                "JWT_REFRESH_TOKEN_EXPIRY_SECONDS must be positive",
            ));
        }

        if self.jwt.private_key_path.is_some() != self.jwt.public_key_path.is_some() {
            return Err(config_error(
                "JWT_PRIVATE_KEY_PATH and JWT_PUBLIC_KEY_PATH must be set together",
            ));
        }

        if !self.jwt.uses_rsa() {
            let secret_len = self
                .jwt
                .secret
                .as_ref()
                .map(|s| s.expose_secret().len())
                .unwrap_or(0);
            if secret_len < MIN_HS512_SECRET_BYTES {
                return Err(config_error(&format!(
                    "JWT_SECRET must be at least {} bytes when no RSA key pair is configured",
                    MIN_HS512_SECRET_BYTES
                )));
            }
        }

        if self.login.max_failed_attempts == 0 {
            return Err(config_error("LOGIN_MAX_FAILED_ATTEMPTS must be at least 1"));
        }

        if self.login.lock_duration_minutes <= 0 {
            return Err(config_error("LOGIN_LOCK_DURATION_MINUTES must be positive"));
        }

        if self.login.password_reset_token_expiry_minutes <= 0 {
            return Err(config_error(
                "PASSWORD_RESET_TOKEN_EXPIRY_MINUTES must be positive",
            ));
        }

        if self.rate_limit.enabled
            && (self.rate_limit.unauthenticated_limit == 0
                || self.rate_limit.authenticated_limit == 0
                || self.rate_limit.window_seconds == 0)
        {
            return Err(config_error(
                "Rate limit quotas and window must be positive when rate limiting is enabled",
            ));
        }

        let downstream = &self.downstream;
        if !(1.0..=100.0).contains(&downstream.circuit_breaker_failure_rate_threshold) {
            return Err(config_error(
                "CIRCUIT_BREAKER_FAILURE_RATE_THRESHOLD must be between 1 and 100",
            ));
        }

        if downstream.circuit_breaker_window_size == 0 {
            return Err(config_error("CIRCUIT_BREAKER_WINDOW_SIZE must be positive"));
        }

        if downstream.circuit_breaker_minimum_calls > downstream.circuit_breaker_window_size {
            return Err(config_error(
                "CIRCUIT_BREAKER_MINIMUM_CALLS cannot exceed CIRCUIT_BREAKER_WINDOW_SIZE",
            ));
        }

        if downstream.circuit_breaker_half_open_calls == 0 {
            return Err(config_error(
                "CIRCUIT_BREAKER_HALF_OPEN_CALLS must be at least 1",
            ));
        }

        if downstream.timeout_seconds == 0 {
            return Err(config_error("DOWNSTREAM_TIMEOUT_SECONDS must be positive"));
        }

        if self.bootstrap.owner_email.is_some() != self.bootstrap.owner_password.is_some() {
            return Err(config_error(
                "BOOTSTRAP_OWNER_EMAIL and BOOTSTRAP_OWNER_PASSWORD must be set together",
            ));
        }

        if let Some(password) = &self.bootstrap.owner_password {
            if password.expose_secret().len() < 8 {
                return Err(config_error(
                    "BOOTSTRAP_OWNER_PASSWORD must be at least 8 characters",
                ));
            }
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error(
                    "Wildcard CORS origin not allowed in production",
                ));
            }

            if !self.email.smtp_configured() {
                tracing::warn!("SMTP is not configured in production; reset emails will only be logged");
            }
        }

        Ok(())
    }
}

fn config_error(msg: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.to_string()))
}

fn get_env(
    source: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: Option<&str>,
    is_prod: bool,
) -> Result<String, AppError> {
    match source(key) {
        Some(val) => Ok(val),
        None => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_optional_env(source: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    source(key).filter(|v| !v.trim().is_empty())
}

fn parse<T>(key: &str, raw: String) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!(format!("Invalid value for {}: {}", key, e)))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig, AppError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_source(core_config::Config::default(), &|key: &str| map.get(key).cloned())
    }

    #[test]
    fn dev_defaults_apply() {
        let config = load(&[("JWT_SECRET", SECRET)]).unwrap();

        assert_eq!(config.environment, Environment::Dev);
        assert_eq!(config.jwt.access_token_expiry_seconds, 3600);
        assert_eq!(config.jwt.refresh_token_expiry_seconds, 604800);
        assert_eq!(config.login.max_failed_attempts, 5);
        assert_eq!(config.login.lock_duration_minutes, 30);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.unauthenticated_limit, 100);
        assert_eq!(config.rate_limit.authenticated_limit, 1000);
        assert_eq!(config.downstream.core_service_url, "http://localhost:8081");
        assert_eq!(config.downstream.retry().max_retries, 2);
        assert_eq!(config.downstream.circuit_breaker().window_size, 10);
        assert!(!config.email.smtp_configured());
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = load(&[("JWT_SECRET", "too-short")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn rsa_paths_replace_secret() {
        let config = load(&[
            ("JWT_PRIVATE_KEY_PATH", "/keys/private.pem"),
            ("JWT_PUBLIC_KEY_PATH", "/keys/public.pem"),
        ])
        .unwrap();
        assert!(config.jwt.uses_rsa());
    }

    #[test]
    fn half_configured_rsa_is_rejected() {
        assert!(load(&[
            ("JWT_SECRET", SECRET),
            ("JWT_PRIVATE_KEY_PATH", "/keys/private.pem"),
        ])
        .is_err());
    }

    #[test]
    fn zero_lockout_threshold_is_rejected() {
        assert!(load(&[("JWT_SECRET", SECRET), ("LOGIN_MAX_FAILED_ATTEMPTS", "0")]).is_err());
    }

    #[test]
    fn failure_rate_must_be_a_percentage() {
        assert!(load(&[
            ("JWT_SECRET", SECRET),
            ("CIRCUIT_BREAKER_FAILURE_RATE_THRESHOLD", "120")
        ])
        .is_err());
        assert!(load(&[
            ("JWT_SECRET", SECRET),
            ("CIRCUIT_BREAKER_FAILURE_RATE_THRESHOLD", "0")
        ])
        .is_err());
    }

    #[test]
    fn minimum_calls_cannot_exceed_window() {
        assert!(load(&[
            ("JWT_SECRET", SECRET),
            ("CIRCUIT_BREAKER_WINDOW_SIZE", "4"),
            ("CIRCUIT_BREAKER_MINIMUM_CALLS", "5"),
        ])
        .is_err());
    }

    #[test]
    fn unparsable_number_names_the_key() {
        let err = load(&[("JWT_SECRET", SECRET), ("RATE_LIMIT_WINDOW_SECONDS", "soon")])
            .unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_WINDOW_SECONDS"));
    }

    #[test]
    fn prod_requires_explicit_values() {
        let err = load(&[("ENVIRONMENT", "prod"), ("JWT_SECRET", SECRET)]).unwrap_err();
        assert!(err.to_string().contains("required in production"));
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();
        assert_eq!(
            config.security.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn bootstrap_owner_needs_both_email_and_password() {
        assert!(load(&[("JWT_SECRET", SECRET), ("BOOTSTRAP_OWNER_EMAIL", "owner@school.test")]).is_err());

        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("BOOTSTRAP_OWNER_EMAIL", "owner@school.test"),
            ("BOOTSTRAP_OWNER_PASSWORD", "Sup3rSecret!"),
        ])
        .unwrap();
        let (email, _) = config.bootstrap.owner().unwrap();
        assert_eq!(email, "owner@school.test");
        assert_eq!(config.bootstrap.owner_name, "Owner");
    }
}
