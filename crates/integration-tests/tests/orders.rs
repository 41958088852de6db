//! Order placement, stock accounting and the status machine.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::StatusCode;
use serde_json::{Value, json};

use greens_integration_tests::{TestContext, TestUser, api, error_code};

async fn set_status(ctx: &TestContext, user: &TestUser, order: i64, status: &str) -> reqwest::Response {
    ctx.client
        .put(api(&format!("/orders/{order}/status")))
        .bearer_auth(&user.access_token)
        .json(&json!({"status": status}))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_alice_buys_until_stock_runs_out() {
    let ctx = TestContext::new();
    let alice = ctx.user("alice").await;
    let buyer = ctx.user("buyer").await;

    let product = ctx.product(&alice, "10.00", 5).await;
    let product_id = product["id"].as_i64().unwrap();

    let resp = ctx.order(&buyer, &[(product_id, 3)]).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let order: Value = resp.json().await.unwrap();
    assert_eq!(order["total_amount"], "30.00");
    assert_eq!(ctx.get_product(product_id).await["stock_quantity"], 2);

    let resp = ctx.order(&buyer, &[(product_id, 3)]).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(resp).await, "INSUFFICIENT_STOCK");
    assert_eq!(ctx.get_product(product_id).await["stock_quantity"], 2);
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_failing_line_leaves_other_stock_untouched() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller").await;
    let buyer = ctx.user("buyer").await;

    let plenty = ctx.product(&seller, "4.50", 5).await["id"].as_i64().unwrap();
    let scarce = ctx.product(&seller, "7.25", 1).await["id"].as_i64().unwrap();

    let resp = ctx.order(&buyer, &[(plenty, 2), (scarce, 3)]).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    assert_eq!(ctx.get_product(plenty).await["stock_quantity"], 5);
    assert_eq!(ctx.get_product(scarce).await["stock_quantity"], 1);
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_cannot_order_own_product() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller").await;
    let product = ctx.product(&seller, "3.00", 2).await["id"].as_i64().unwrap();

    let resp = ctx.order(&seller, &[(product, 1)]).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_status_machine_and_cancellation_restock() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller").await;
    let buyer = ctx.user("buyer").await;
    let product = ctx.product(&seller, "10.00", 5).await["id"].as_i64().unwrap();

    let order: Value = ctx.order(&buyer, &[(product, 2)]).await.json().await.unwrap();
    let order_id = order["id"].as_i64().unwrap();

    let resp = set_status(&ctx, &seller, order_id, "delivered").await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(resp).await, "INVALID_TRANSITION");

    let resp = set_status(&ctx, &buyer, order_id, "cancelled").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cancelled: Value = resp.json().await.unwrap();
    assert_eq!(cancelled["status"], "cancelled");
    assert!(cancelled["cancelled_at"].is_string());

    assert_eq!(ctx.get_product(product).await["stock_quantity"], 5);
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_payment_flow_notifies_seller() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller").await;
    let buyer = ctx.user("buyer").await;
    let product = ctx.product(&seller, "12.00", 3).await["id"].as_i64().unwrap();

    let order: Value = ctx.order(&buyer, &[(product, 1)]).await.json().await.unwrap();
    let order_id = order["id"].as_i64().unwrap();

    let short = ctx
        .client
        .post(api(&format!("/orders/{order_id}/payment")))
        .bearer_auth(&buyer.access_token)
        .json(&json!({"method": "card", "amount": "11.00"}))
        .send()
        .await
        .unwrap();
    assert_eq!(short.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(short).await, "PAYMENT_FAILED");

    let other = ctx.user("other").await;
    let fresh: Value = ctx.order(&buyer, &[(product, 1)]).await.json().await.unwrap();
    let fresh_id = fresh["id"].as_i64().unwrap();

    let stranger = ctx
        .client
        .get(api(&format!("/orders/{fresh_id}")))
        .bearer_auth(&other.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(stranger.status(), StatusCode::NOT_FOUND);

    let paid = ctx
        .client
        .post(api(&format!("/orders/{fresh_id}/payment")))
        .bearer_auth(&buyer.access_token)
        .json(&json!({"method": "card", "amount": "12.00"}))
        .send()
        .await
        .unwrap();
    assert_eq!(paid.status(), StatusCode::OK);
    let paid: Value = paid.json().await.unwrap();
    assert_eq!(paid["status"], "paid");
    assert_eq!(paid["payment_status"], "paid");
    assert_eq!(paid["escrow_status"], "held");

    let resp = set_status(&ctx, &seller, fresh_id, "shipped").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let notifications: Value = ctx
        .client
        .get(api("/notifications?unread_only=true"))
        .bearer_auth(&seller.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(notifications["unread_count"].as_i64().unwrap() >= 2);
}
