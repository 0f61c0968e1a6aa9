//! Auth guard: bearer token to [`Principal`].
//!
//! Every failure (missing header, bad signature, expiry, unknown subject,
//! role mismatch) collapses into [`AppError::Unauthenticated`] so callers
//! cannot tell which check failed.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::{Principal, Role};
use crate::services::credentials::TokenService;

const BEARER_PREFIX: &str = "Bearer ";

pub fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthenticated)
}

pub fn authenticate(
    conn: &Connection,
    tokens: &TokenService,
    headers: &HeaderMap,
) -> AppResult<Principal> {
    let token = bearer_token(headers)?;

    let claims = tokens.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "token verification failed");
        AppError::Unauthenticated
    })?;

    let principal = resolve_subject(conn, &claims.sub)?.ok_or_else(|| {
        tracing::debug!(subject = %claims.sub, "token subject not found");
        AppError::Unauthenticated
    })?;

    if principal.role() != claims.role {
        tracing::debug!(subject = %claims.sub, "token role does not match subject");
        return Err(AppError::Unauthenticated);
    }

    Ok(principal)
}

/// Users are probed before providers.
fn resolve_subject(conn: &Connection, id: &str) -> AppResult<Option<Principal>> {
    if let Some(user) = queries::get_user(conn, id)? {
        return Ok(Some(Principal::User(user)));
    }
    Ok(queries::get_provider(conn, id)?.map(Principal::Provider))
}

pub fn require_user(principal: &Principal, action: &str) -> AppResult<()> {
    match principal.role() {
        Role::User => Ok(()),
        Role::Provider => Err(AppError::forbidden(format!(
            "Access denied. Only clients can {action}."
        ))),
    }
}

pub fn require_provider(principal: &Principal, action: &str) -> AppResult<()> {
    match principal.role() {
        Role::Provider => Ok(()),
        Role::User => Err(AppError::forbidden(format!(
            "Access denied. Only service providers can {action}."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::User;
    use axum::http::HeaderValue;
    use chrono::Utc;

    fn setup() -> (Connection, TokenService) {
        let conn = db::init_db(":memory:").unwrap();
        queries::insert_user(
            &conn,
            &User {
                id: "u1".to_string(),
                name: "Asha".to_string(),
                email: "asha@example.com".to_string(),
                phone: "9000000001".to_string(),
                password_hash: "hash".to_string(),
                image: None,
                is_verified: false,
                total_bookings: 0,
                created_at: Utc::now().naive_utc(),
            },
        )
        .unwrap();
        (conn, TokenService::new("test-secret", 1))
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_missing_header_is_unauthenticated() {
        let (conn, tokens) = setup();
        let err = authenticate(&conn, &tokens, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[test]
    fn test_non_bearer_scheme_is_unauthenticated() {
        let (conn, tokens) = setup();
        let err = authenticate(&conn, &tokens, &headers("Basic dXNlcjpwYXNz")).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[test]
    fn test_valid_token_resolves_user() {
        let (conn, tokens) = setup();
        let issued = tokens.issue("u1", Role::User).unwrap();
        let principal =
            authenticate(&conn, &tokens, &headers(&format!("Bearer {}", issued.token))).unwrap();
        assert_eq!(principal.id(), "u1");
        assert_eq!(principal.role(), Role::User);
    }

    #[test]
    fn test_unknown_subject_is_unauthenticated() {
        let (conn, tokens) = setup();
        let issued = tokens.issue("ghost", Role::User).unwrap();
        let err = authenticate(&conn, &tokens, &headers(&format!("Bearer {}", issued.token)))
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[test]
    fn test_role_mismatch_is_unauthenticated() {
        let (conn, tokens) = setup();
        let issued = tokens.issue("u1", Role::Provider).unwrap();
        let err = authenticate(&conn, &tokens, &headers(&format!("Bearer {}", issued.token)))
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[test]
    fn test_garbage_token_is_unauthenticated() {
        let (conn, tokens) = setup();
        let err = authenticate(&conn, &tokens, &headers("Bearer not.a.jwt")).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }
}
