//! Registration, login and token lifecycle.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::StatusCode;
use serde_json::{Value, json};

use greens_integration_tests::{PASSWORD, TestContext, api, error_code, unique};

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_duplicate_email_is_conflict_regardless_of_username() {
    let ctx = TestContext::new();
    let user = ctx.user("dup").await;

    let resp = ctx
        .register(&user.email.to_uppercase(), &format!("other_{}", unique()), PASSWORD)
        .await;

    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(resp).await, "DUPLICATE_EMAIL");
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_username_is_case_insensitively_unique() {
    let ctx = TestContext::new();
    let user = ctx.user("case").await;

    let resp = ctx
        .register(
            &format!("fresh_{}@example.com", unique()),
            &user.username.to_uppercase(),
            PASSWORD,
        )
        .await;

    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(resp).await, "DUPLICATE_USERNAME");
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_weak_password_is_rejected() {
    let ctx = TestContext::new();
    let name = format!("weak_{}", unique());

    let resp = ctx
        .register(&format!("{name}@example.com"), &name, "onlyletters")
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(resp).await, "WEAK_PASSWORD");
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_wrong_password_and_unknown_user_look_the_same() {
    let ctx = TestContext::new();
    let user = ctx.user("login").await;

    let wrong = ctx.login(&user.email, "not-the-password-1").await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let wrong_code = error_code(wrong).await;

    let unknown = ctx
        .login(&format!("ghost_{}@example.com", unique()), PASSWORD)
        .await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(wrong_code, "INVALID_CREDENTIALS");
    assert_eq!(error_code(unknown).await, wrong_code);
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_refresh_rotates_and_old_token_is_revoked() {
    let ctx = TestContext::new();
    let user = ctx.user("rotate").await;

    let resp = ctx
        .client
        .post(api("/auth/refresh"))
        .json(&json!({"refresh_token": user.refresh_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let pair: Value = resp.json().await.unwrap();
    assert!(pair["access_token"].is_string());

    let reused = ctx
        .client
        .post(api("/auth/refresh"))
        .json(&json!({"refresh_token": user.refresh_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(reused.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_logout_revokes_refresh_token() {
    let ctx = TestContext::new();
    let user = ctx.user("logout").await;

    for _ in 0..2 {
        let resp = ctx
            .client
            .post(api("/auth/logout"))
            .json(&json!({"refresh_token": user.refresh_token}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    let resp = ctx
        .client
        .post(api("/auth/refresh"))
        .json(&json!({"refresh_token": user.refresh_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_protected_route_requires_bearer() {
    let ctx = TestContext::new();

    let anonymous = ctx.client.get(api("/users/profile")).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(anonymous).await, "UNAUTHENTICATED");

    let user = ctx.user("profile").await;
    let resp = ctx
        .client
        .get(api("/users/profile"))
        .bearer_auth(&user.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let profile: Value = resp.json().await.unwrap();
    assert_eq!(profile["username"], user.username.as_str());
    assert!(profile.get("password_hash").is_none());
}
