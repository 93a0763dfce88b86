mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Email address for login (unique, stored lowercased).
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// User role: "admin" or "user".
    pub role: String,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// User ID.
    pub user_id: String,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// Active rental of a book by a user.
///
/// There is at most one rental per (user, book) pair; renewing replaces
/// the end date and period in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rental {
    /// User ID.
    pub user_id: String,
    /// Book ID.
    pub book_id: String,
    /// Rental end timestamp.
    pub end_date: i64,
    /// Rental period code: "2weeks", "1month" or "3months".
    pub period: String,
    /// When the rental was created or last renewed.
    pub rented_at: i64,
}

/// Notification in a user's log.
///
/// Append-only; only the read flag is ever mutated. Rental notices carry
/// a (book_id, kind) key so the expiration sweep can stay idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID.
    pub id: String,
    /// User ID.
    pub user_id: String,
    /// Book the notice refers to (rental notices only).
    pub book_id: Option<String>,
    /// Notice kind: "expiring" or "expired" (rental notices only).
    pub kind: Option<String>,
    /// Message text.
    pub message: String,
    /// Creation timestamp.
    pub created_at: i64,
    /// Whether the user has read the notification.
    pub read: bool,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
