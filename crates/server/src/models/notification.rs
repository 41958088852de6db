use chrono::{DateTime, Utc};
use serde::Serialize;

use greens_core::{NotificationId, UserId};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Notification kinds emitted by marketplace flows.
pub mod kinds {
    pub const ORDER_PLACED: &str = "order_placed";
    pub const ORDER_STATUS: &str = "order_status";
    pub const PAYMENT_RECEIVED: &str = "payment_received";
    pub const NEW_REVIEW: &str = "new_review";
}

/// A page of notifications plus the caller's unread count.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationList {
    pub items: Vec<Notification>,
    pub unread_count: i64,
    pub page: u32,
    pub limit: u32,
}
