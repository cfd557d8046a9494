use gateway_service::{
    build_router,
    config::GatewayConfig,
    services::{
        ensure_owner, AuthDependencies, AuthSessionService, DownstreamGateway, EmailProvider,
        EmailService, HttpCoreClient, InMemoryCredentialStore, InMemoryPasswordResetStore,
        InMemorySessionStore, JwtService, LockoutConfig, LoggingEmailProvider, LoginPolicy,
    },
    utils::{Argon2Hasher, Password, PasswordHasher},
    AppState,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::observability::init_tracing;
use service_core::resilience::{CircuitBreakerRegistry, TokenBucketLimiter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on bad configuration
    let config = Arc::new(GatewayConfig::from_env()?);

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting gateway"
    );

    let credentials = Arc::new(InMemoryCredentialStore::new());
    let sessions = Arc::new(InMemorySessionStore::new());
    let reset_tokens = Arc::new(InMemoryPasswordResetStore::new());
    let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher);

    if let Some((email, password)) = config.bootstrap.owner() {
        ensure_owner(
            credentials.as_ref(),
            hasher.as_ref(),
            email,
            &Password::new(password.expose_secret().clone()),
            &config.bootstrap.owner_name,
        )
        .await?;
    }

    let email: Arc<dyn EmailProvider> = if config.email.smtp_configured() {
        tracing::info!("SMTP email provider initialized");
        Arc::new(EmailService::new(&config.email)?)
    } else {
        tracing::warn!("SMTP not configured; password reset emails will be logged only");
        Arc::new(LoggingEmailProvider)
    };

    let jwt = JwtService::new(&config.jwt)?;
    tracing::info!(rsa = config.jwt.uses_rsa(), "JWT service initialized");

    let core_client = HttpCoreClient::new(&config.downstream.core_service_url)?;
    let downstream = Arc::new(DownstreamGateway::new(
        Arc::new(core_client.clone()),
        CircuitBreakerRegistry::new(config.downstream.circuit_breaker()),
        config.downstream.timeout(),
        config.downstream.retry(),
    ));
    tracing::info!(core_service_url = %config.downstream.core_service_url, "Downstream gateway initialized");

    let policy = LoginPolicy::new(
        credentials.clone(),
        hasher.clone(),
        LockoutConfig {
            max_failed_attempts: config.login.max_failed_attempts,
            lock_duration: chrono::Duration::minutes(config.login.lock_duration_minutes),
        },
    );

    let auth = Arc::new(AuthSessionService::new(
        AuthDependencies {
            credentials,
            sessions,
            reset_tokens,
            hasher,
            email,
            downstream: downstream.clone(),
            jwt: jwt.clone(),
        },
        policy,
        chrono::Duration::minutes(config.login.password_reset_token_expiry_minutes),
        config.email.frontend_url.clone(),
    ));

    let rate_limiter = Arc::new(TokenBucketLimiter::new());
    spawn_bucket_eviction(
        rate_limiter.clone(),
        Duration::from_secs(config.rate_limit.window_seconds.max(1)),
    );

    let state = AppState {
        config: config.clone(),
        auth,
        jwt,
        downstream,
        rate_limiter,
        core_client,
    };
    let app = build_router(state);

    let addr = config.common.socket_addr();

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Gateway shutdown complete");
    Ok(())
}

/// Periodically drop buckets idle for several windows so the map does not grow without bound.
fn spawn_bucket_eviction(limiter: Arc<TokenBucketLimiter>, window: Duration) {
    let max_idle = window * 5;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(max_idle);
        loop {
            ticker.tick().await;
            let evicted = limiter.evict_idle(max_idle);
            if evicted > 0 {
                tracing::debug!(evicted, remaining = limiter.len(), "Evicted idle rate-limit buckets");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
