use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::errors::AppResult;
use crate::handlers::extract::JsonBody;
use crate::models::{Principal, PrincipalSummary};
use crate::services::accounts::{self, LoginRequest, LoginResponse, SignupRequest};
use crate::state::AppState;

// POST /api/auth/signup
pub async fn signup(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> AppResult<(StatusCode, Json<PrincipalSummary>)> {
    let account = accounts::prepare_signup(&req)?;
    let mut db = state.db()?;
    let summary = accounts::register(&mut db, account)?;
    Ok((StatusCode::CREATED, Json(summary)))
}

// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let attempt = {
        let db = state.db()?;
        accounts::find_login(&db, &req)?
    };
    Ok(Json(accounts::verify_login(&state.tokens, attempt)?))
}

// GET /api/auth/me
pub async fn me(principal: Principal) -> Json<PrincipalSummary> {
    Json(principal.summary())
}
