//! Integration tests for the Greens marketplace API.
//!
//! Every test talks HTTP to a running server and is `#[ignore]`d by default.
//!
//! # Running Tests
//!
//! ```bash
//! greens-cli migrate
//! cargo run -p greens-server &
//! GREENS_BASE_URL=http://localhost:8080 cargo test -p greens-integration-tests -- --ignored
//! ```
//!
//! Tests create their own uniquely named users and products, so they can run
//! against a shared database.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

pub const PASSWORD: &str = "greens-test-1";

/// Base URL of the server under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("GREENS_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

/// `{base_url}/api/v1{path}`.
#[must_use]
pub fn api(path: &str) -> String {
    format!("{}/api/v1{path}", base_url())
}

/// Short random suffix for unique usernames and emails.
#[must_use]
pub fn unique() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// A registered, logged-in user.
pub struct TestUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

pub struct TestContext {
    pub client: Client,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::builder().build().unwrap(),
        }
    }

    /// Register and log in a fresh user named `{prefix}_{random}`.
    pub async fn user(&self, prefix: &str) -> TestUser {
        let username = format!("{prefix}_{}", unique());
        let email = format!("{username}@example.com");

        let resp = self.register(&email, &username, PASSWORD).await;
        assert_eq!(resp.status(), StatusCode::CREATED, "register {username}");
        let user: Value = resp.json().await.unwrap();

        let resp = self.login(&username, PASSWORD).await;
        assert_eq!(resp.status(), StatusCode::OK, "login {username}");
        let tokens: Value = resp.json().await.unwrap();

        TestUser {
            id: user["id"].as_i64().unwrap(),
            username,
            email,
            access_token: tokens["access_token"].as_str().unwrap().to_string(),
            refresh_token: tokens["refresh_token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn register(&self, email: &str, username: &str, password: &str) -> Response {
        self.client
            .post(api("/auth/register"))
            .json(&json!({"email": email, "username": username, "password": password}))
            .send()
            .await
            .unwrap()
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Response {
        self.client
            .post(api("/auth/login"))
            .json(&json!({"identifier": identifier, "password": password}))
            .send()
            .await
            .unwrap()
    }

    /// List a product as `seller` and return its JSON.
    pub async fn product(&self, seller: &TestUser, price: &str, stock: i64) -> Value {
        let resp = self
            .client
            .post(api("/products"))
            .bearer_auth(&seller.access_token)
            .json(&json!({
                "title": format!("Heirloom tomato seedling {}", unique()),
                "description": "Organic, grown in peat-free compost",
                "price": price,
                "currency": "USD",
                "condition": "new",
                "stock_quantity": stock,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    pub async fn get_product(&self, id: i64) -> Value {
        let resp = self
            .client
            .get(api(&format!("/products/{id}")))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        resp.json().await.unwrap()
    }

    /// Place an order for `(product_id, quantity)` lines.
    pub async fn order(&self, buyer: &TestUser, lines: &[(i64, i64)]) -> Response {
        let items: Vec<Value> = lines
            .iter()
            .map(|(product_id, quantity)| json!({"product_id": product_id, "quantity": quantity}))
            .collect();
        self.client
            .post(api("/orders"))
            .bearer_auth(&buyer.access_token)
            .json(&json!({"items": items}))
            .send()
            .await
            .unwrap()
    }
}

/// The `code` field of an error body.
pub async fn error_code(resp: Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["code"].as_str().unwrap_or_default().to_string()
}
