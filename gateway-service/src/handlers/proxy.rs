use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, Method, Uri},
    response::{IntoResponse, Response},
};
use service_core::{error::AppError, middleware::tracing::REQUEST_ID_HEADER};

use crate::{
    middleware::{USER_ID_HEADER, USER_ROLES_HEADER},
    AppState,
};

const FORWARDED_REQUEST_HEADERS: [HeaderName; 2] = [header::CONTENT_TYPE, header::ACCEPT];
const FORWARDED_IDENTITY_HEADERS: [&str; 3] = [USER_ID_HEADER, USER_ROLES_HEADER, REQUEST_ID_HEADER];

/// Pass an authenticated `/api/*` call through to the core service with the caller identity attached.
pub async fn forward_to_core(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let url = format!("{}{}", state.core_client.base_url(), path_and_query);

    let mut builder = state.core_client.http().request(method.clone(), &url);
    for name in FORWARDED_REQUEST_HEADERS.iter() {
        if let Some(value) = headers.get(name) {
            builder = builder.header(name, value);
        }
    }
    for name in FORWARDED_IDENTITY_HEADERS {
        if let Some(value) = headers.get(name) {
            builder = builder.header(name, value);
        }
    }
    if !body.is_empty() {
        builder = builder.body(body);
    }

    let timeout = state.config.downstream.timeout();
    let upstream = match tokio::time::timeout(timeout, builder.send()).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, %method, path = %uri.path(), "Core service request failed");
            return Err(AppError::BadGateway("Core service request failed".to_string()));
        }
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, %method, path = %uri.path(), "Core service request timed out");
            return Err(AppError::ServiceUnavailable(
                "Core service did not respond in time".to_string(),
            ));
        }
    };

    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();

    let bytes = match tokio::time::timeout(timeout, upstream.bytes()).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Failed to read core service response");
            return Err(AppError::BadGateway("Core service response was truncated".to_string()));
        }
        Err(_) => {
            return Err(AppError::ServiceUnavailable(
                "Core service did not respond in time".to_string(),
            ));
        }
    };

    let mut response = (status, Body::from(bytes)).into_response();
    if let Some(content_type) = content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }

    Ok(response)
}
