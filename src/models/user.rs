use chrono::NaiveDateTime;
use serde::Serialize;

/// A client account. The password hash never leaves the store layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip)]
    pub password_hash: String,
    pub image: Option<String>,
    pub is_verified: bool,
    pub total_bookings: i64,
    pub created_at: NaiveDateTime,
}
