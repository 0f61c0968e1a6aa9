use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;

use crate::db::queries::ProviderStats;
use crate::errors::AppResult;
use crate::handlers::extract::{JsonBody, QueryParams};
use crate::models::{BookingView, Principal};
use crate::services::booking::{
    self, BookingList, ListQuery, NewBooking, PendingRequests, ReasonBody,
};
use crate::state::AppState;

/// Reject and cancel take an optional `{reason}` body; a missing or
/// unparsable body means no reason.
fn reason(body: &Option<Json<ReasonBody>>) -> Option<&str> {
    body.as_ref().and_then(|Json(b)| b.reason.as_deref())
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    JsonBody(req): JsonBody<NewBooking>,
) -> AppResult<(StatusCode, Json<BookingView>)> {
    let today = Utc::now().date_naive();
    let mut db = state.db()?;
    let view = booking::create(&mut db, &principal, &req, today)?;
    Ok((StatusCode::CREATED, Json(view)))
}

// GET /api/bookings/client
pub async fn client_bookings(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    QueryParams(query): QueryParams<ListQuery>,
) -> AppResult<Json<BookingList>> {
    let db = state.db()?;
    Ok(Json(booking::list_for_client(&db, &principal, &query)?))
}

// GET /api/bookings/provider
pub async fn provider_bookings(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    QueryParams(query): QueryParams<ListQuery>,
) -> AppResult<Json<BookingList>> {
    let db = state.db()?;
    Ok(Json(booking::list_for_provider(&db, &principal, &query)?))
}

// GET /api/bookings/provider/requests
pub async fn pending_requests(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> AppResult<Json<PendingRequests>> {
    let db = state.db()?;
    Ok(Json(booking::pending_requests(&db, &principal)?))
}

// GET /api/bookings/provider/stats
pub async fn provider_stats(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> AppResult<Json<ProviderStats>> {
    let today = Utc::now().date_naive();
    let db = state.db()?;
    Ok(Json(booking::provider_stats(&db, &principal, today)?))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<BookingView>> {
    let db = state.db()?;
    Ok(Json(booking::get(&db, &id, &principal)?))
}

// PUT /api/bookings/:id/accept
pub async fn accept_booking(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<BookingView>> {
    let mut db = state.db()?;
    Ok(Json(booking::accept(&mut db, &id, &principal)?))
}

// PUT /api/bookings/:id/reject
pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> AppResult<Json<BookingView>> {
    let mut db = state.db()?;
    Ok(Json(booking::reject(&mut db, &id, &principal, reason(&body))?))
}

// PUT /api/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<BookingView>> {
    let mut db = state.db()?;
    Ok(Json(booking::complete(&mut db, &id, &principal)?))
}

// PUT /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> AppResult<Json<BookingView>> {
    let mut db = state.db()?;
    Ok(Json(booking::cancel(&mut db, &id, &principal, reason(&body))?))
}
