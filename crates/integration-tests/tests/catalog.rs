//! Listings, reviews and search.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::StatusCode;
use serde_json::{Value, json};

use greens_integration_tests::{TestContext, api, error_code, unique};

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_only_owner_can_edit_and_delete_hides_product() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller").await;
    let other = ctx.user("other").await;
    let product = ctx.product(&seller, "6.00", 4).await["id"].as_i64().unwrap();

    let resp = ctx
        .client
        .put(api(&format!("/products/{product}")))
        .bearer_auth(&other.access_token)
        .json(&json!({"price": "1.00"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = ctx
        .client
        .delete(api(&format!("/products/{product}")))
        .bearer_auth(&seller.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = ctx
        .client
        .get(api(&format!("/products/{product}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_review_rules() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller").await;
    let buyer = ctx.user("buyer").await;
    let product = ctx.product(&seller, "8.00", 4).await["id"].as_i64().unwrap();
    let url = api(&format!("/products/{product}/reviews"));

    let own = ctx
        .client
        .post(&url)
        .bearer_auth(&seller.access_token)
        .json(&json!({"rating": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(own.status(), StatusCode::FORBIDDEN);

    let out_of_range = ctx
        .client
        .post(&url)
        .bearer_auth(&buyer.access_token)
        .json(&json!({"rating": 6}))
        .send()
        .await
        .unwrap();
    assert_eq!(out_of_range.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(out_of_range).await, "INVALID_RATING");

    let first = ctx
        .client
        .post(&url)
        .bearer_auth(&buyer.access_token)
        .json(&json!({"rating": 4, "title": "Thriving", "body": "Fruiting by July"}))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let review: Value = first.json().await.unwrap();
    assert_eq!(review["is_verified_purchase"], false);

    let again = ctx
        .client
        .post(&url)
        .bearer_auth(&buyer.access_token)
        .json(&json!({"rating": 3}))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_keyword_search_finds_new_listing() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller").await;
    let product = ctx.product(&seller, "5.00", 1).await;
    let title = product["title"].as_str().unwrap();
    let marker = title.rsplit(' ').next().unwrap();

    let resp = ctx
        .client
        .get(api("/search"))
        .query(&[("q", marker)])
        .bearer_auth(&seller.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let page: Value = resp.json().await.unwrap();
    let ids: Vec<i64> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["id"].as_i64())
        .collect();
    assert!(ids.contains(&product["id"].as_i64().unwrap()));
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_semantic_search_reports_mode() {
    let ctx = TestContext::new();
    let user = ctx.user("search").await;

    let resp = ctx
        .client
        .post(api("/search/semantic"))
        .bearer_auth(&user.access_token)
        .json(&json!({"query": "tomato seedlings", "limit": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let results: Value = resp.json().await.unwrap();
    let mode = results["mode"].as_str().unwrap();
    assert!(mode == "semantic" || mode == "keyword_fallback");

    let empty = ctx
        .client
        .post(api("/search/semantic"))
        .bearer_auth(&user.access_token)
        .json(&json!({"query": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "Requires running server, PostgreSQL and Redis"]
async fn test_keyword_fallback_honours_unaligned_offset() {
    let ctx = TestContext::new();
    let seller = ctx.user("seller").await;
    let marker = format!("fallbackmarker{}", unique());

    for n in 0..3 {
        let resp = ctx
            .client
            .post(api("/products"))
            .bearer_auth(&seller.access_token)
            .json(&json!({
                "title": format!("Rainbow chard {marker} lot {n}"),
                "price": "3.00",
                "stock_quantity": 1,
                "condition": "new",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let semantic: Value = ctx
        .client
        .post(api("/search/semantic"))
        .bearer_auth(&seller.access_token)
        .json(&json!({"query": marker, "limit": 2, "offset": 1}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    if semantic["mode"] != "keyword_fallback" {
        return;
    }

    let keyword: Value = ctx
        .client
        .get(api("/search"))
        .query(&[("q", marker.as_str()), ("limit", "3")])
        .bearer_auth(&seller.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let ids = |items: &Value| -> Vec<i64> {
        items
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|hit| hit["id"].as_i64())
            .collect()
    };
    let all = ids(&keyword["items"]);
    assert_eq!(all.len(), 3);
    assert_eq!(ids(&semantic["items"]), all[1..].to_vec());
}
