use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Plumber,
    Carpenter,
    Gardener,
    Painter,
    Electrician,
    Cleaner,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Plumber,
        Category::Carpenter,
        Category::Gardener,
        Category::Painter,
        Category::Electrician,
        Category::Cleaner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Plumber => "plumber",
            Category::Carpenter => "carpenter",
            Category::Gardener => "gardener",
            Category::Painter => "painter",
            Category::Electrician => "electrician",
            Category::Cleaner => "cleaner",
        }
    }

    /// Case-insensitive; surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProviderStatus {
    Online,
    Offline,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Online => "Online",
            ProviderStatus::Offline => "Offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Some(ProviderStatus::Online),
            "offline" => Some(ProviderStatus::Offline),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ProviderStatus::Online)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub reviewer_id: String,
    pub rating: f64,
    pub comment: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityWindow {
    pub date: NaiveDate,
    pub time_slots: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip)]
    pub password_hash: String,
    pub category: Category,
    pub experience: i64,
    pub price: f64,
    pub status: ProviderStatus,
    pub image: Option<String>,
    pub rating: f64,
    pub reviews: Vec<Review>,
    pub availability: Vec<AvailabilityWindow>,
    pub is_verified: bool,
    pub total_bookings: i64,
    pub created_at: NaiveDateTime,
}

/// Arithmetic mean of the review ratings; an empty list rates 0.
pub fn mean_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let total: f64 = reviews.iter().map(|r| r.rating).sum();
    total / reviews.len() as f64
}
