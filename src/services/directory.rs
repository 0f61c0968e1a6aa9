//! Provider directory: listing, profile upkeep and reviews.

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::provider::mean_rating;
use crate::models::{AvailabilityWindow, Category, Principal, Provider, ProviderStatus, Review};
use crate::services::input::{non_negative, non_negative_whole, present, Numeric};

const PROVIDER_NOT_FOUND: &str = "Service provider not found";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderQuery {
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub category: Option<String>,
    pub experience: Option<Numeric>,
    pub price: Option<Numeric>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityInput {
    pub date: String,
    #[serde(default)]
    pub time_slots: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityUpdate {
    pub availability: Vec<AvailabilityInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub user_id: Option<String>,
    pub rating: Option<Numeric>,
    pub comment: Option<String>,
}

/// An empty or absent category lists everyone.
pub fn list(conn: &Connection, query: &ProviderQuery) -> AppResult<Vec<Provider>> {
    let category = match present(&query.category) {
        Some(c) => Some(
            Category::parse(c).ok_or_else(|| AppError::validation(format!("Unknown category: {c}")))?,
        ),
        None => None,
    };
    Ok(queries::list_providers(conn, category)?)
}

pub fn get(conn: &Connection, id: &str) -> AppResult<Provider> {
    queries::get_provider(conn, id)?.ok_or_else(|| AppError::not_found(PROVIDER_NOT_FOUND))
}

pub fn reviews(conn: &Connection, id: &str) -> AppResult<Vec<Review>> {
    Ok(get(conn, id)?.reviews)
}

/// Providers may only edit their own record.
fn require_self<'a>(principal: &'a Principal, id: &str) -> AppResult<&'a Provider> {
    match principal.as_provider() {
        Some(p) if p.id == id => Ok(p),
        _ => Err(AppError::forbidden(
            "Access denied. Providers can only update their own profile.",
        )),
    }
}

pub fn update_profile(
    conn: &Connection,
    principal: &Principal,
    id: &str,
    update: &ProfileUpdate,
) -> AppResult<Provider> {
    require_self(principal, id)?;
    let mut provider = get(conn, id)?;

    if let Some(name) = present(&update.name) {
        provider.name = name.to_string();
    }
    if let Some(phone) = present(&update.phone) {
        provider.phone = phone.to_string();
    }
    if let Some(c) = present(&update.category) {
        provider.category =
            Category::parse(c).ok_or_else(|| AppError::validation(format!("Unknown category: {c}")))?;
    }
    if let Some(experience) = &update.experience {
        provider.experience = non_negative_whole("experience", experience)?;
    }
    if let Some(price) = &update.price {
        provider.price = non_negative("price", price)?;
    }
    if let Some(image) = present(&update.image) {
        provider.image = Some(image.to_string());
    }

    if !queries::update_provider_profile(conn, &provider)? {
        return Err(AppError::not_found(PROVIDER_NOT_FOUND));
    }
    tracing::info!(provider_id = %id, "provider profile updated");
    Ok(provider)
}

pub fn set_status(
    conn: &Connection,
    principal: &Principal,
    id: &str,
    update: &StatusUpdate,
) -> AppResult<Provider> {
    require_self(principal, id)?;
    let status = ProviderStatus::parse(&update.status).ok_or_else(|| {
        AppError::validation(format!(
            "Status must be Online or Offline, got: {}",
            update.status
        ))
    })?;

    if !queries::set_provider_status(conn, id, status)? {
        return Err(AppError::not_found(PROVIDER_NOT_FOUND));
    }
    tracing::info!(provider_id = %id, status = status.as_str(), "provider status changed");
    get(conn, id)
}

pub fn set_availability(
    conn: &Connection,
    principal: &Principal,
    id: &str,
    update: &AvailabilityUpdate,
) -> AppResult<Provider> {
    require_self(principal, id)?;

    let mut windows = Vec::with_capacity(update.availability.len());
    for input in &update.availability {
        let date = NaiveDate::parse_from_str(input.date.trim(), "%Y-%m-%d").map_err(|_| {
            AppError::validation(format!("Invalid availability date: {}", input.date))
        })?;
        let time_slots: Vec<String> = input
            .time_slots
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if time_slots.is_empty() {
            return Err(AppError::validation(format!(
                "Availability for {date} needs at least one time slot"
            )));
        }
        windows.push(AvailabilityWindow { date, time_slots });
    }
    windows.sort_by_key(|w| w.date);

    if !queries::set_provider_availability(conn, id, &windows)? {
        return Err(AppError::not_found(PROVIDER_NOT_FOUND));
    }
    get(conn, id)
}

/// Appends a review and recomputes the mean rating in one transaction.
pub fn add_review(conn: &mut Connection, id: &str, input: &NewReview) -> AppResult<Provider> {
    let reviewer_id = present(&input.user_id)
        .ok_or_else(|| AppError::validation("Missing required fields: userId"))?
        .to_string();
    let rating = input
        .rating
        .as_ref()
        .and_then(Numeric::as_f64)
        .filter(|r| (0.0..=5.0).contains(r))
        .ok_or_else(|| AppError::validation("Rating must be a number between 0 and 5"))?;

    let review = Review {
        reviewer_id,
        rating,
        comment: present(&input.comment).map(str::to_string),
        created_at: Utc::now().naive_utc(),
    };

    let tx = conn.transaction()?;
    if queries::get_provider(&tx, id)?.is_none() {
        return Err(AppError::not_found(PROVIDER_NOT_FOUND));
    }
    queries::insert_review(&tx, id, &review)?;
    let reviews = queries::list_reviews(&tx, id)?;
    queries::set_provider_rating(&tx, id, mean_rating(&reviews))?;
    tx.commit()?;

    tracing::info!(provider_id = %id, rating, "review added");
    get(conn, id)
}
