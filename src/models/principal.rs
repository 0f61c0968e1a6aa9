use serde::{Deserialize, Serialize};

use super::{Category, Provider, User};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Provider,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Provider => "provider",
        }
    }

    /// Accepts the wire spellings used by signup/login forms.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "user" | "client" => Some(Role::User),
            "provider" | "serviceProvider" | "service_provider" => Some(Role::Provider),
            _ => None,
        }
    }
}

/// An authenticated subject, resolved once per request by the auth guard.
#[derive(Debug, Clone)]
pub enum Principal {
    User(User),
    Provider(Provider),
}

impl Principal {
    pub fn id(&self) -> &str {
        match self {
            Principal::User(u) => &u.id,
            Principal::Provider(p) => &p.id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Principal::User(_) => Role::User,
            Principal::Provider(_) => Role::Provider,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            Principal::User(u) => Some(u),
            Principal::Provider(_) => None,
        }
    }

    pub fn as_provider(&self) -> Option<&Provider> {
        match self {
            Principal::Provider(p) => Some(p),
            Principal::User(_) => None,
        }
    }

    pub fn summary(&self) -> PrincipalSummary {
        match self {
            Principal::User(u) => PrincipalSummary::from(u),
            Principal::Provider(p) => PrincipalSummary::from(p),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalSummary {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl From<&User> for PrincipalSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            role: Role::User,
            name: u.name.clone(),
            email: u.email.clone(),
            image: u.image.clone(),
            category: None,
        }
    }
}

impl From<&Provider> for PrincipalSummary {
    fn from(p: &Provider) -> Self {
        Self {
            id: p.id.clone(),
            role: Role::Provider,
            name: p.name.clone(),
            email: p.email.clone(),
            image: p.image.clone(),
            category: Some(p.category),
        }
    }
}
