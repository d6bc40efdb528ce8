//! Bearer-token authentication.

use std::fmt;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use gamegrid_agent::{AgentError, Identity};
use tracing::debug;

use crate::ApiState;
use crate::response::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    Forbidden(String),
    /// The identity service could not be asked.
    Unavailable(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "missing bearer token"),
            Self::InvalidToken => write!(f, "invalid or expired token"),
            Self::Forbidden(why) => write!(f, "forbidden: {why}"),
            Self::Unavailable(why) => write!(f, "identity service unavailable: {why}"),
        }
    }
}

/// The caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl AuthUser {
    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }

    /// Owners, admins and service accounts.
    pub fn require_access(&self, owner_id: &str) -> Result<(), AuthError> {
        if self.0.can_access(owner_id) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "{} may not act on resources of {owner_id}",
                self.0.user_id
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.0.is_admin() {
            Ok(())
        } else {
            Err(AuthError::Forbidden("admin role required".to_string()))
        }
    }

    pub fn require_service_account(&self) -> Result<(), AuthError> {
        if self.0.is_service_account() {
            Ok(())
        } else {
            Err(AuthError::Forbidden("service account role required".to_string()))
        }
    }

    /// Admins or service accounts.
    pub fn require_privileged(&self) -> Result<(), AuthError> {
        if self.0.is_admin() || self.0.is_service_account() {
            Ok(())
        } else {
            Err(AuthError::Forbidden("privileged role required".to_string()))
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        match state.identity.validate_token(token).await {
            Ok(identity) => {
                debug!(user_id = %identity.user_id, "request authenticated");
                Ok(AuthUser(identity))
            }
            Err(AgentError::InvalidToken) => Err(AuthError::InvalidToken.into()),
            Err(e) => Err(AuthError::Unavailable(e.to_string()).into()),
        }
    }
}
