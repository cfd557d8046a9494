//! Calls into the core service, guarded by a circuit breaker, a timeout and bounded retry.
//!
//! Every attempt passes through the breaker for the target. Outcomes count as:
//! - 2xx: success (an undecodable body still counts as success)
//! - 404 and other 4xx: ignored, surfaced as `NotFound` / `Rejected`
//! - 5xx, timeout, transport error: failure, surfaced as unavailable and retried

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use service_core::middleware::tracing::{current_request_id, REQUEST_ID_HEADER};
use service_core::resilience::{
    retry_with_backoff, CallOutcome, CircuitBreakerRegistry, CircuitOpenError, CircuitState,
    RetryConfig,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{
    ApiResponse, CreateStudentRequest, ParentProfile, Profile, StudentProfile, TeacherProfile,
    UserType,
};

/// Breaker name for the core service.
pub const CORE_SERVICE: &str = "core-service";

/// Marks service-to-service traffic for the core service.
pub const INTERNAL_REQUEST_HEADER: &str = "x-internal-request";

#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("resource not found")]
    NotFound,

    #[error("request rejected with status {status}")]
    Rejected { status: u16 },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("{} account has no profile reference", .0.as_str())]
    MissingReference(UserType),
}

impl DownstreamError {
    /// Only failures the breaker counts are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, DownstreamError::Timeout(_) | DownstreamError::Unavailable(_))
    }
}

#[derive(Debug, Clone)]
pub struct CoreRequest {
    pub method: Method,
    /// Path relative to the core service base URL, e.g. `/internal/students/7`.
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl CoreRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoreResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Transport to the core service. Errors mean no HTTP response was obtained.
#[async_trait]
pub trait CoreServiceClient: Send + Sync {
    async fn send(&self, request: CoreRequest) -> Result<CoreResponse, anyhow::Error>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpCoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCoreClient {
    pub fn new(base_url: &str) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CoreServiceClient for HttpCoreClient {
    async fn send(&self, request: CoreRequest) -> Result<CoreResponse, anyhow::Error> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .request(request.method, &url)
            .header(INTERNAL_REQUEST_HEADER, "true")
            .header(header::ACCEPT, "application/json");

        if let Some(request_id) = current_request_id() {
            builder = builder.header(REQUEST_ID_HEADER, request_id);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Request to {} failed: {}", url, e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read response from {}: {}", url, e))?;

        Ok(CoreResponse { status, body })
    }
}

pub struct DownstreamGateway {
    client: Arc<dyn CoreServiceClient>,
    breakers: CircuitBreakerRegistry,
    timeout: Duration,
    retry: RetryConfig,
}

impl DownstreamGateway {
    pub fn new(
        client: Arc<dyn CoreServiceClient>,
        breakers: CircuitBreakerRegistry,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client,
            breakers,
            timeout,
            retry,
        }
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn core_state(&self) -> CircuitState {
        self.breakers.get(CORE_SERVICE).state()
    }

    /// Admin and staff have no profile; the other kinds must carry a reference.
    pub async fn fetch_profile(
        &self,
        user_type: UserType,
        reference_id: Option<i64>,
    ) -> Result<Option<Profile>, DownstreamError> {
        if user_type.is_internal_staff() {
            return Ok(None);
        }

        let id = reference_id.ok_or(DownstreamError::MissingReference(user_type))?;

        let profile = match user_type {
            UserType::Student => Profile::Student(
                self.call::<StudentProfile>("fetch_student_profile", CoreRequest::get(format!("/internal/students/{}", id)))
                    .await?,
            ),
            UserType::Teacher => Profile::Teacher(
                self.call::<TeacherProfile>("fetch_teacher_profile", CoreRequest::get(format!("/internal/teachers/{}", id)))
                    .await?,
            ),
            UserType::Parent => Profile::Parent(
                self.call::<ParentProfile>("fetch_parent_profile", CoreRequest::get(format!("/internal/parents/{}", id)))
                    .await?,
            ),
            UserType::Admin | UserType::Staff => return Ok(None),
        };

        Ok(Some(profile))
    }

    pub async fn create_student(
        &self,
        request: &CreateStudentRequest,
    ) -> Result<StudentProfile, DownstreamError> {
        let body =
            serde_json::to_value(request).map_err(|e| DownstreamError::Decode(e.to_string()))?;

        self.call("create_student", CoreRequest::post("/internal/students", body))
            .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: CoreRequest,
    ) -> Result<T, DownstreamError> {
        retry_with_backoff(&self.retry, operation, DownstreamError::is_transient, || {
            self.attempt(&request)
        })
        .await
    }

    async fn attempt<T: DeserializeOwned>(&self, request: &CoreRequest) -> Result<T, DownstreamError> {
        let permit = self.breakers.get(CORE_SERVICE).try_acquire()?;

        let response = match tokio::time::timeout(self.timeout, self.client.send(request.clone())).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                permit.record(CallOutcome::Failure);
                return Err(DownstreamError::Unavailable(e.to_string()));
            }
            Err(_) => {
                permit.record(CallOutcome::Failure);
                return Err(DownstreamError::Timeout(self.timeout));
            }
        };

        let status = response.status;
        if status.is_success() {
            permit.record(CallOutcome::Success);
            return serde_json::from_slice::<ApiResponse<T>>(&response.body)
                .map(|envelope| envelope.data)
                .map_err(|e| DownstreamError::Decode(e.to_string()));
        }

        if status == StatusCode::NOT_FOUND {
            permit.record(CallOutcome::Ignored);
            return Err(DownstreamError::NotFound);
        }

        if status.is_server_error() {
            permit.record(CallOutcome::Failure);
            return Err(DownstreamError::Unavailable(format!(
                "{} {} returned {}",
                request.method, request.path, status
            )));
        }

        permit.record(CallOutcome::Ignored);
        Err(DownstreamError::Rejected {
            status: status.as_u16(),
        })
    }
}
