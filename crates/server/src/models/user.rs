//! User account and preference types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use greens_core::{Email, UserId, VerificationTier};

/// A marketplace account.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub username: String,
    /// Argon2id PHC string.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub verification_tier: VerificationTier,
    pub reputation_score: Decimal,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable profile fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
}

/// Per-user settings and bounded history.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserPreferences {
    pub theme: String,
    pub language: String,
    pub currency: String,
    pub email_notifications: bool,
    pub push_notifications: bool,
    /// Product IDs, most recent first.
    pub browsing_history: Vec<i32>,
    /// Queries, most recent first.
    pub search_history: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesUpdate {
    pub theme: Option<String>,
    pub language: Option<String>,
    pub currency: Option<String>,
    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
}
