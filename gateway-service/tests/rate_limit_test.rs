mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{body_json, TestApp};
use gateway_service::middleware::{RATE_LIMIT_REMAINING_HEADER, RATE_LIMIT_RETRY_AFTER_HEADER};
use gateway_service::models::UserType;

fn health_from(ip: &str) -> Request<Body> {
    Request::builder()
        .uri("/health")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn anonymous_callers_get_quota_then_429() {
    let app = TestApp::with_env(&[("RATE_LIMIT_UNAUTHENTICATED", "3")]);

    for expected in ["2", "1", "0"] {
        let res = app.request(health_from("198.51.100.1")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[RATE_LIMIT_REMAINING_HEADER], expected);
    }

    let res = app.request(health_from("198.51.100.1")).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()[RATE_LIMIT_REMAINING_HEADER], "0");
    assert_eq!(res.headers()[RATE_LIMIT_RETRY_AFTER_HEADER], "60");
    assert_eq!(res.headers()[header::RETRY_AFTER], "60");

    let body = body_json(res).await;
    assert_eq!(body["error"], "Too many requests");
    assert_eq!(
        body["details"],
        "Rate limit exceeded. Please try again later."
    );
}

#[tokio::test]
async fn buckets_are_per_client_ip() {
    let app = TestApp::with_env(&[("RATE_LIMIT_UNAUTHENTICATED", "1")]);

    assert_eq!(
        app.request(health_from("198.51.100.1")).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        app.request(health_from("198.51.100.1")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(
        app.request(health_from("198.51.100.2")).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn authenticated_callers_use_their_own_quota() {
    let app = TestApp::with_env(&[
        ("RATE_LIMIT_UNAUTHENTICATED", "2"),
        ("RATE_LIMIT_AUTHENTICATED", "50"),
    ]);
    app.seed_user("admin@school.test", UserType::Admin, None).await;
    // login itself spends one anonymous token
    let session = app.login("admin@school.test").await;
    let token = session["accessToken"].as_str().unwrap();

    let res = app.get_with_token("/auth/me", token).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[RATE_LIMIT_REMAINING_HEADER], "49");

    // anonymous bucket for the same IP is unaffected by authenticated traffic
    let res = app.request(health_from(&common_ip())).await;
    assert_eq!(res.headers()[RATE_LIMIT_REMAINING_HEADER], "0");
}

#[tokio::test]
async fn forged_identity_header_does_not_select_user_bucket() {
    let app = TestApp::with_env(&[("RATE_LIMIT_UNAUTHENTICATED", "1")]);

    let forged = || {
        Request::builder()
            .uri("/health")
            .header("x-user-id", "42")
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(app.request(forged()).await.status(), StatusCode::OK);
    assert_eq!(
        app.request(forged()).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn disabled_limiter_adds_no_headers() {
    let app = TestApp::with_env(&[
        ("RATE_LIMIT_ENABLED", "false"),
        ("RATE_LIMIT_UNAUTHENTICATED", "1"),
    ]);

    for _ in 0..3 {
        let res = app.request(health_from("198.51.100.1")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!res.headers().contains_key(RATE_LIMIT_REMAINING_HEADER));
    }
}

fn common_ip() -> String {
    let [a, b, c, d] = common::CLIENT_IP;
    format!("{}.{}.{}.{}", a, b, c, d)
}
