use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::{is_constraint_violation, AppError, AppResult};
use crate::models::{Category, PrincipalSummary, Provider, ProviderStatus, Role, User};
use crate::services::credentials::{self, IssuedToken, TokenService, MIN_PASSWORD_LENGTH};
use crate::services::input::{
    looks_like_email, non_negative, non_negative_whole, present, require_fields, Numeric,
};

const EMAIL_TAKEN: &str = "Email already registered";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub user_type: Option<String>,
    pub category: Option<String>,
    pub experience: Option<Numeric>,
    pub price: Option<Numeric>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub user_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub user_type: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PrincipalSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_provider: Option<PrincipalSummary>,
}

fn parse_role(user_type: &Option<String>) -> AppResult<Role> {
    match present(user_type) {
        None => Ok(Role::User),
        Some(s) => Role::parse(s).ok_or_else(|| AppError::validation(format!("Unknown userType: {s}"))),
    }
}

/// A validated signup with its password already hashed, ready to store.
#[derive(Debug)]
pub struct NewAccount {
    role: Role,
    name: String,
    email: String,
    phone: String,
    password_hash: String,
    image: Option<String>,
    provider_fields: Option<(Category, i64, f64)>,
}

/// Validates a signup and hashes its password. Needs no connection, so
/// callers run it before taking the store lock.
pub fn prepare_signup(req: &SignupRequest) -> AppResult<NewAccount> {
    let role = parse_role(&req.user_type)?;

    let mut fields = vec![
        ("name", present(&req.name).is_some()),
        ("email", present(&req.email).is_some()),
        ("phone", present(&req.phone).is_some()),
        ("password", req.password.as_deref().is_some_and(|p| !p.is_empty())),
    ];
    if role == Role::Provider {
        fields.push(("category", present(&req.category).is_some()));
        fields.push(("experience", req.experience.is_some()));
        fields.push(("price", req.price.is_some()));
    }
    require_fields(&fields)?;

    let email = present(&req.email).unwrap_or_default().to_lowercase();
    let password = req.password.as_deref().unwrap_or_default();

    if !looks_like_email(&email) {
        return Err(AppError::validation("Please provide a valid email address"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    // Provider-only fields are validated before the (slow) hash.
    let provider_fields = match role {
        Role::Provider => {
            let category_str = present(&req.category).unwrap_or_default();
            let category = Category::parse(category_str).ok_or_else(|| {
                AppError::validation(format!("Unknown category: {category_str}"))
            })?;
            let experience = req
                .experience
                .as_ref()
                .map(|e| non_negative_whole("experience", e))
                .transpose()?
                .unwrap_or_default();
            let price = req
                .price
                .as_ref()
                .map(|p| non_negative("price", p))
                .transpose()?
                .unwrap_or_default();
            Some((category, experience, price))
        }
        Role::User => None,
    };

    Ok(NewAccount {
        role,
        name: present(&req.name).unwrap_or_default().to_string(),
        email,
        phone: present(&req.phone).unwrap_or_default().to_string(),
        password_hash: credentials::hash_password(password)?,
        image: present(&req.image).map(str::to_string),
        provider_fields,
    })
}

/// Stores a prepared account. The email check and the insert share one
/// transaction so two signups cannot claim the same address.
pub fn register(conn: &mut Connection, account: NewAccount) -> AppResult<PrincipalSummary> {
    let NewAccount {
        role,
        name,
        email,
        phone,
        password_hash,
        image,
        provider_fields,
    } = account;
    let now = Utc::now().naive_utc();
    let id = uuid::Uuid::new_v4().to_string();

    let tx = conn.transaction()?;
    if queries::email_registered(&tx, &email)? {
        return Err(AppError::Conflict(EMAIL_TAKEN.to_string()));
    }

    let summary = match (role, provider_fields) {
        (Role::Provider, Some((category, experience, price))) => {
            let provider = Provider {
                id,
                name,
                email,
                phone,
                password_hash,
                category,
                experience,
                price,
                status: ProviderStatus::Online,
                image,
                rating: 0.0,
                reviews: vec![],
                availability: vec![],
                is_verified: false,
                total_bookings: 0,
                created_at: now,
            };
            queries::insert_provider(&tx, &provider).map_err(duplicate_email_or_internal)?;
            PrincipalSummary::from(&provider)
        }
        _ => {
            let user = User {
                id,
                name,
                email,
                phone,
                password_hash,
                image,
                is_verified: false,
                total_bookings: 0,
                created_at: now,
            };
            queries::insert_user(&tx, &user).map_err(duplicate_email_or_internal)?;
            PrincipalSummary::from(&user)
        }
    };
    tx.commit()?;

    tracing::info!(id = %summary.id, role = summary.role.as_str(), "account registered");
    Ok(summary)
}

fn duplicate_email_or_internal(e: anyhow::Error) -> AppError {
    if is_constraint_violation(&e) {
        AppError::Conflict(EMAIL_TAKEN.to_string())
    } else {
        AppError::Internal(e)
    }
}

/// The stored side of a login: what the store knew about the email.
#[derive(Debug)]
pub struct LoginAttempt {
    role: Role,
    password: String,
    found: Option<(String, PrincipalSummary)>,
}

/// Looks the email up in the store named by `userType`. Password checks
/// happen later in [`verify_login`], once the store lock is released.
pub fn find_login(conn: &Connection, req: &LoginRequest) -> AppResult<LoginAttempt> {
    let role = parse_role(&req.user_type)?;
    let email = present(&req.email)
        .map(str::to_lowercase)
        .ok_or(AppError::InvalidCredentials)?;

    let found = match role {
        Role::User => queries::find_user_by_email(conn, &email)?
            .map(|u| (u.password_hash.clone(), PrincipalSummary::from(&u))),
        Role::Provider => queries::find_provider_by_email(conn, &email)?
            .map(|p| (p.password_hash.clone(), PrincipalSummary::from(&p))),
    };

    Ok(LoginAttempt {
        role,
        password: req.password.clone().unwrap_or_default(),
        found,
    })
}

/// Verifies the password and issues a bearer token. Unknown email and
/// wrong password are indistinguishable.
pub fn verify_login(tokens: &TokenService, attempt: LoginAttempt) -> AppResult<LoginResponse> {
    let LoginAttempt {
        role,
        password,
        found,
    } = attempt;

    let Some((password_hash, summary)) = found else {
        credentials::verify_against_dummy(&password);
        tracing::info!(role = role.as_str(), "login failed: unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !credentials::verify_password(&password, &password_hash) {
        tracing::info!(id = %summary.id, "login failed: wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = tokens
        .issue(&summary.id, role)
        .map_err(|e| AppError::Internal(e.into()))?;

    tracing::info!(id = %summary.id, role = role.as_str(), "login succeeded");

    let (user, service_provider) = match role {
        Role::User => (Some(summary), None),
        Role::Provider => (None, Some(summary)),
    };
    Ok(LoginResponse {
        token,
        user_type: role,
        user,
        service_provider,
    })
}
