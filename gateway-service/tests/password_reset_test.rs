mod common;

use axum::http::StatusCode;
use common::{body_json, TestApp, PASSWORD};
use gateway_service::handlers::auth::password::{FORGOT_PASSWORD_MESSAGE, RESET_PASSWORD_MESSAGE};
use gateway_service::models::UserType;
use serde_json::json;

const NEW_PASSWORD: &str = "N3w-Passw0rd!";

async fn request_reset_token(app: &TestApp, email: &str) -> String {
    let res = app
        .post_json("/auth/forgot-password", json!({ "email": email }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let sent = app.email.sent();
    let (to, token) = sent.last().expect("reset email should be sent");
    assert_eq!(to, email);
    token.clone()
}

#[tokio::test]
async fn forgot_password_does_not_reveal_unknown_accounts() {
    let app = TestApp::spawn();
    app.seed_user("known@school.test", UserType::Admin, None).await;

    let unknown = app
        .post_json("/auth/forgot-password", json!({ "email": "nobody@school.test" }))
        .await;
    let known = app
        .post_json("/auth/forgot-password", json!({ "email": "known@school.test" }))
        .await;

    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(known.status(), StatusCode::OK);
    let unknown = body_json(unknown).await;
    assert_eq!(unknown, body_json(known).await);
    assert_eq!(unknown["message"], FORGOT_PASSWORD_MESSAGE);

    assert_eq!(app.email.sent().len(), 1);
}

#[tokio::test]
async fn reset_sets_new_password_and_revokes_sessions() {
    let app = TestApp::spawn();
    let user = app.seed_user("staff@school.test", UserType::Staff, None).await;
    let session = app.login("staff@school.test").await;
    let token = request_reset_token(&app, "staff@school.test").await;

    let res = app
        .post_json(
            "/auth/reset-password",
            json!({ "token": token, "newPassword": NEW_PASSWORD }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["message"], RESET_PASSWORD_MESSAGE);

    assert!(app.sessions.is_empty());
    assert_eq!(app.reset_tokens.count_for_user(user.id), 1);

    let old = app
        .post_json(
            "/auth/login",
            json!({ "email": "staff@school.test", "password": PASSWORD }),
        )
        .await;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);

    let new = app
        .post_json(
            "/auth/login",
            json!({ "email": "staff@school.test", "password": NEW_PASSWORD }),
        )
        .await;
    assert_eq!(new.status(), StatusCode::OK);

    let refresh = app
        .post_json(
            "/auth/refresh",
            json!({ "refreshToken": session["refreshToken"] }),
        )
        .await;
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reset_token_cannot_be_reused() {
    let app = TestApp::spawn();
    app.seed_user("staff@school.test", UserType::Staff, None).await;
    let token = request_reset_token(&app, "staff@school.test").await;

    let first = app
        .post_json(
            "/auth/reset-password",
            json!({ "token": token, "newPassword": NEW_PASSWORD }),
        )
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .post_json(
            "/auth/reset-password",
            json!({ "token": token, "newPassword": "An0ther-Passw0rd" }),
        )
        .await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(second).await["error"],
        "Password reset token already used"
    );
}

#[tokio::test]
async fn newer_reset_request_supersedes_older_token() {
    let app = TestApp::spawn();
    app.seed_user("staff@school.test", UserType::Staff, None).await;
    let first = request_reset_token(&app, "staff@school.test").await;
    let _second = request_reset_token(&app, "staff@school.test").await;

    let res = app
        .post_json(
            "/auth/reset-password",
            json!({ "token": first, "newPassword": NEW_PASSWORD }),
        )
        .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "Invalid password reset token");
}

#[tokio::test]
async fn short_new_password_is_rejected() {
    let app = TestApp::spawn();

    let res = app
        .post_json(
            "/auth/reset-password",
            json!({ "token": "abc", "newPassword": "short" }),
        )
        .await;

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn forgot_password_route_is_throttled_per_ip() {
    let app = TestApp::with_env(&[("RATE_LIMIT_PASSWORD_RESET_ATTEMPTS", "2")]);

    for _ in 0..2 {
        let res = app
            .post_json("/auth/forgot-password", json!({ "email": "a@school.test" }))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = app
        .post_json("/auth/forgot-password", json!({ "email": "a@school.test" }))
        .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().contains_key("retry-after"));
}
