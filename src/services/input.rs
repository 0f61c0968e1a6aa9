//! Request-field helpers shared by the account, directory and booking
//! services. Form-driven clients send numbers either as JSON numbers or
//! as strings, so both are accepted.

use serde::Deserialize;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Number(n) => Some(*n),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
        .filter(|n: &f64| n.is_finite())
    }
}

impl From<f64> for Numeric {
    fn from(n: f64) -> Self {
        Numeric::Number(n)
    }
}

/// Trimmed, non-empty text or `None`.
pub fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Fails with every missing field named, in the order given.
pub fn require_fields(fields: &[(&str, bool)]) -> AppResult<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

pub fn non_negative(field: &str, value: &Numeric) -> AppResult<f64> {
    match value.as_f64() {
        Some(n) if n >= 0.0 => Ok(n),
        _ => Err(AppError::validation(format!(
            "{field} must be a number greater than or equal to 0"
        ))),
    }
}

pub fn non_negative_whole(field: &str, value: &Numeric) -> AppResult<i64> {
    let n = non_negative(field, value)?;
    if n.fract() != 0.0 || n > i64::MAX as f64 {
        return Err(AppError::validation(format!("{field} must be a whole number")));
    }
    Ok(n as i64)
}

pub fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
