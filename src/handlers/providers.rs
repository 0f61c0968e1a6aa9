use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::errors::AppResult;
use crate::handlers::extract::{JsonBody, QueryParams};
use crate::models::{Principal, Provider, Review};
use crate::services::directory::{
    self, AvailabilityUpdate, NewReview, ProfileUpdate, ProviderQuery, StatusUpdate,
};
use crate::state::AppState;

// GET /api/providers?category=
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<ProviderQuery>,
) -> AppResult<Json<Vec<Provider>>> {
    let db = state.db()?;
    Ok(Json(directory::list(&db, &query)?))
}

// GET /api/providers/:id
pub async fn get_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Provider>> {
    let db = state.db()?;
    Ok(Json(directory::get(&db, &id)?))
}

// PUT /api/providers/:id
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<ProfileUpdate>,
) -> AppResult<Json<Provider>> {
    let db = state.db()?;
    Ok(Json(directory::update_profile(&db, &principal, &id, &update)?))
}

// PATCH /api/providers/:id/status
pub async fn set_status(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<StatusUpdate>,
) -> AppResult<Json<Provider>> {
    let db = state.db()?;
    Ok(Json(directory::set_status(&db, &principal, &id, &update)?))
}

// PUT /api/providers/:id/availability
pub async fn set_availability(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<AvailabilityUpdate>,
) -> AppResult<Json<Provider>> {
    let db = state.db()?;
    Ok(Json(directory::set_availability(&db, &principal, &id, &update)?))
}

// GET /api/providers/:id/reviews
pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Review>>> {
    let db = state.db()?;
    Ok(Json(directory::reviews(&db, &id)?))
}

// POST /api/providers/:id/reviews
pub async fn add_review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(review): JsonBody<NewReview>,
) -> AppResult<Json<Provider>> {
    let mut db = state.db()?;
    Ok(Json(directory::add_review(&mut db, &id, &review)?))
}
