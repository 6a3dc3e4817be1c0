#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{bearer, register_and_login, send, TestContext};
use timekeeper::auth::{verify_access_token, RESET_PASSWORD_COOKIE};
use timekeeper::store::UserStore;
use timekeeper::tokens::{TokenKey, TokenKind};

#[actix_rt::test]
async fn test_signup_verification() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    let access = register_and_login(&app, "a@x.com", "user1", "testtest1").await;
    let token = ctx.token_for("a@x.com", TokenKind::Signup);
    assert!(ctx.backends.tokens.contains(&TokenKey::new(TokenKind::Signup, token.clone())));

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/verify-signup-token?token={}", token))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK, "body: {}", reply.body);
    assert!(!ctx.backends.tokens.contains(&TokenKey::new(TokenKind::Signup, token.clone())));

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header(bearer(&access))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.body["isVerified"], true);

    // A consumed token cannot be replayed.
    let req = test::TestRequest::get()
        .uri(&format!("/api/users/verify-signup-token?token={}", token))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "The provided token is invalid.");
}

#[actix_rt::test]
async fn test_unknown_signup_token_is_rejected() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    register_and_login(&app, "a@x.com", "user1", "testtest1").await;

    let req = test::TestRequest::get()
        .uri("/api/users/verify-signup-token?token=deadbeef")
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_reissued_reset_token_replaces_previous() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    register_and_login(&app, "a@x.com", "user1", "testtest1").await;

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/users/send-reset-password-email")
            .set_json(json!({ "email": "a@x.com" }))
            .to_request();
        assert_eq!(send(&app, req).await.status, StatusCode::OK);
    }

    let sent: Vec<String> = ctx
        .notifier
        .sent()
        .into_iter()
        .filter(|s| s.kind == TokenKind::ResetPassword)
        .map(|s| s.token)
        .collect();
    assert_eq!(sent.len(), 2);
    let (first, second) = (&sent[0], &sent[1]);
    assert!(!ctx.backends.tokens.contains(&TokenKey::new(TokenKind::ResetPassword, first.clone())));

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/verify-reset-password-token?token={}", first))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/verify-reset-password-token?token={}", second))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.cookie(RESET_PASSWORD_COOKIE).unwrap().value(), second.as_str());
}

#[actix_rt::test]
async fn test_password_reset() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    register_and_login(&app, "a@x.com", "user1", "testtest1").await;

    let req = test::TestRequest::post()
        .uri("/api/users/send-reset-password-email")
        .set_json(json!({ "email": "a@x.com" }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::OK);
    let token = ctx.token_for("a@x.com", TokenKind::ResetPassword);

    let req = test::TestRequest::post()
        .uri("/api/users/change-password")
        .set_json(json!({
            "token": "wrong",
            "password": "newpass123",
            "confirmPassword": "newpass123"
        }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "a@x.com", "password": "testtest1" }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::OK);

    // Check the link, then change the password through the cookie it sets.
    let req = test::TestRequest::get()
        .uri(&format!("/api/users/verify-reset-password-token?token={}", token))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK);
    let cookie = reply.cookie(RESET_PASSWORD_COOKIE).unwrap();

    let req = test::TestRequest::post()
        .uri("/api/users/change-password")
        .cookie(cookie)
        .set_json(json!({ "password": "newpass123", "confirmPassword": "newpass123" }))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK, "body: {}", reply.body);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "a@x.com", "password": "testtest1" }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "a@x.com", "password": "newpass123" }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::OK);
}

#[actix_rt::test]
async fn test_change_password_without_token() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/users/change-password")
        .set_json(json!({ "password": "newpass123", "confirmPassword": "newpass123" }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_change_email() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    let access = register_and_login(&app, "a@x.com", "user1", "testtest1").await;
    register_and_login(&app, "taken@x.com", "user2", "testtest1").await;

    let req = test::TestRequest::post()
        .uri("/api/users/send-change-email-token")
        .insert_header(bearer(&access))
        .set_json(json!({ "email": "taken@x.com" }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/users/send-change-email-token")
        .insert_header(bearer(&access))
        .set_json(json!({ "email": "b@x.com" }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::OK);
    // The link goes to the new address.
    let token = ctx.token_for("b@x.com", TokenKind::ChangeEmail);

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/verify-change-email-token?token={}", token))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK, "body: {}", reply.body);
    assert_eq!(reply.body["user"]["email"], "b@x.com");

    let renewed = reply.body["accessToken"].as_str().unwrap();
    let claims = verify_access_token(renewed, common::JWT_SECRET).unwrap();
    assert_eq!(claims.email, "b@x.com");

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "b@x.com", "password": "testtest1" }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "a@x.com", "password": "testtest1" }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_resend_renews_signup_token() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    let access = register_and_login(&app, "a@x.com", "user1", "testtest1").await;
    let old = ctx.token_for("a@x.com", TokenKind::Signup);

    let req = test::TestRequest::post()
        .uri("/api/auth/resend-email")
        .insert_header(bearer(&access))
        .set_json(json!({ "event": "signupToken" }))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK, "body: {}", reply.body);

    let renewed = ctx.token_for("a@x.com", TokenKind::Signup);
    assert_ne!(old, renewed);
    assert!(!ctx.backends.tokens.contains(&TokenKey::new(TokenKind::Signup, old.clone())));
    assert!(ctx.backends.tokens.contains(&TokenKey::new(TokenKind::Signup, renewed.clone())));

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/verify-signup-token?token={}", old))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/verify-signup-token?token={}", renewed))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::OK);

    // Nothing left to resend once verified.
    let req = test::TestRequest::post()
        .uri("/api/auth/resend-email")
        .insert_header(bearer(&access))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_failed_delivery_keeps_the_token() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    register_and_login(&app, "a@x.com", "user1", "testtest1").await;

    ctx.notifier.fail_deliveries(true);
    let req = test::TestRequest::post()
        .uri("/api/users/send-reset-password-email")
        .set_json(json!({ "email": "a@x.com" }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::OK);

    let user = ctx
        .state
        .users
        .find_by_email("a@x.com")
        .await
        .unwrap()
        .unwrap();
    let token = user.reset_password_token.unwrap();
    assert!(ctx.backends.tokens.contains(&TokenKey::new(TokenKind::ResetPassword, token)));
}
