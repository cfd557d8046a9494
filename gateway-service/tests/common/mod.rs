//! Shared setup for gateway integration tests.
//!
//! Builds the full router over in-memory stores and a scripted core service,
//! and drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use gateway_service::{
    build_router,
    config::GatewayConfig,
    models::{NewUser, Role, User, UserStatus, UserType},
    services::{
        AuthDependencies, AuthSessionService, CoreRequest, CoreResponse, CoreServiceClient,
        CredentialStore, DownstreamGateway, HttpCoreClient, InMemoryCredentialStore,
        InMemoryPasswordResetStore, InMemorySessionStore, JwtService, LockoutConfig, LoginPolicy,
        MockEmailService,
    },
    utils::{Argon2Hasher, PasswordHasher},
    AppState,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use service_core::resilience::{CircuitBreakerRegistry, TokenBucketLimiter};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const PASSWORD: &str = "Str0ng!Pass";
pub const JWT_SECRET: &str =
    "test-secret-test-secret-test-secret-test-secret-test-secret-test-secret";
pub const CLIENT_IP: [u8; 4] = [203, 0, 113, 7];

/// Core service stand-in. Replies by path prefix; unmatched paths get 404.
#[derive(Default)]
pub struct FakeCore {
    routes: Mutex<Vec<(String, u16, String)>>,
    requests: Mutex<Vec<CoreRequest>>,
}

impl FakeCore {
    pub fn respond(&self, path_prefix: &str, status: u16, body: Value) {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|(prefix, _, _)| prefix != path_prefix);
        routes.push((path_prefix.to_string(), status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<CoreRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path_prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.path.starts_with(path_prefix))
            .count()
    }
}

#[async_trait]
impl CoreServiceClient for FakeCore {
    async fn send(&self, request: CoreRequest) -> Result<CoreResponse, anyhow::Error> {
        let reply = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _, _)| request.path.starts_with(prefix.as_str()))
            .map(|(_, status, body)| (*status, body.clone()));
        self.requests.lock().unwrap().push(request);

        let (status, body) = reply.unwrap_or((404, "{}".to_string()));
        Ok(CoreResponse {
            status: StatusCode::from_u16(status)?,
            body: Bytes::from(body),
        })
    }
}

pub fn student_profile(id: i64, name: &str) -> Value {
    json!({ "data": { "id": id, "name": name, "status": "ACTIVE" } })
}

pub fn test_config(vars: &[(&str, &str)]) -> GatewayConfig {
    let mut map: HashMap<String, String> = HashMap::from([
        ("JWT_SECRET".to_string(), JWT_SECRET.to_string()),
        ("LOG_LEVEL".to_string(), "error".to_string()),
        ("DOWNSTREAM_MAX_RETRIES".to_string(), "0".to_string()),
        ("DOWNSTREAM_TIMEOUT_SECONDS".to_string(), "2".to_string()),
        // nothing listens here; only proxy tests override it
        ("CORE_SERVICE_URL".to_string(), "http://127.0.0.1:9".to_string()),
    ]);
    for (key, value) in vars {
        map.insert(key.to_string(), value.to_string());
    }

    GatewayConfig::from_source(service_core::config::Config::default(), &|key: &str| {
        map.get(key).cloned()
    })
    .expect("test config should be valid")
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub reset_tokens: Arc<InMemoryPasswordResetStore>,
    pub email: Arc<MockEmailService>,
    pub core: Arc<FakeCore>,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_env(&[])
    }

    pub fn with_env(vars: &[(&str, &str)]) -> Self {
        let config = Arc::new(test_config(vars));

        let credentials = Arc::new(InMemoryCredentialStore::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let reset_tokens = Arc::new(InMemoryPasswordResetStore::new());
        let email = Arc::new(MockEmailService::new());
        let core = Arc::new(FakeCore::default());
        let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher);

        let jwt = JwtService::new(&config.jwt).expect("jwt service");
        let downstream = Arc::new(DownstreamGateway::new(
            core.clone(),
            CircuitBreakerRegistry::new(config.downstream.circuit_breaker()),
            config.downstream.timeout(),
            config.downstream.retry(),
        ));

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
                credentials: credentials.clone(),
                sessions: sessions.clone(),
                reset_tokens: reset_tokens.clone(),
                hasher,
                email: email.clone(),
                downstream: downstream.clone(),
                jwt: jwt.clone(),
            },
            policy,
            chrono::Duration::minutes(config.login.password_reset_token_expiry_minutes),
            config.email.frontend_url.clone(),
        ));

        let core_client =
            HttpCoreClient::new(&config.downstream.core_service_url).expect("core client");

        let state = AppState {
            config,
            auth,
            jwt,
            downstream,
            rate_limiter: Arc::new(TokenBucketLimiter::new()),
            core_client,
        };

        Self {
            router: build_router(state.clone()),
            state,
            credentials,
            sessions,
            reset_tokens,
            email,
            core,
        }
    }

    /// Insert an active identity whose password is [`PASSWORD`].
    pub async fn seed_user(
        &self,
        email: &str,
        user_type: UserType,
        reference_id: Option<i64>,
    ) -> User {
        let role = match user_type {
            UserType::Admin => Role::ADMIN,
            UserType::Staff => Role::STAFF,
            UserType::Teacher => Role::TEACHER,
            UserType::Parent => Role::PARENT,
            UserType::Student => Role::STUDENT,
        };

        self.credentials
            .insert(NewUser {
                email: email.to_string(),
                password_hash: quick_hash(PASSWORD),
                name: "Test User".to_string(),
                phone: None,
                status: UserStatus::Active,
                user_type,
                reference_id,
                roles: vec![role.to_string()],
            })
            .await
            .expect("seed user")
    }

    pub async fn request(&self, mut req: Request<Body>) -> Response {
        if req.extensions().get::<ConnectInfo<SocketAddr>>().is_none() {
            req.extensions_mut()
                .insert(ConnectInfo(SocketAddr::from((CLIENT_IP, 40000))));
        }
        self.router.clone().oneshot(req).await.expect("router call")
    }

    pub async fn post_json(&self, path: &str, body: Value) -> Response {
        self.request(json_request(path, body)).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> Response {
        self.request(
            Request::builder()
                .method("GET")
                .uri(path)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Log in with [`PASSWORD`] and return the session body.
    pub async fn login(&self, email: &str) -> Value {
        let res = self
            .post_json("/auth/login", json!({ "email": email, "password": PASSWORD }))
            .await;
        assert_eq!(res.status(), StatusCode::OK, "login should succeed");
        body_json(res).await
    }
}

pub fn json_request(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(res: Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

/// Low-cost Argon2id hash so seeding stays fast; verification reads params from the hash.
pub fn quick_hash(password: &str) -> String {
    let params = Params::new(1024, 1, 1, None).unwrap();
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}
