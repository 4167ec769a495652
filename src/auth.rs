//! Authenticated request context.
//!
//! Token issuance lives outside this service; requests arrive with an opaque
//! bearer token that maps to a user row. Handlers receive the resolved user
//! as an explicit extractor value, never through globals.

use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use uuid::Uuid;

use crate::{error::AppError, AppState};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub account_status: String,
    pub is_verified: bool,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Authorization token is required".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Authorization token is required".into()))?;

        let user = sqlx::query_as::<_, AuthUser>(
            "SELECT id, name, email, role, account_status, is_verified FROM users WHERE api_token = $1",
        )
        .bind(token)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid authentication token.".into()))?;

        if user.account_status != "active" {
            return Err(AppError::Forbidden(format!(
                "Your account is {}. Please contact support.",
                user.account_status
            )));
        }

        Ok(user)
    }
}

/// Wrapper extractor for routes that additionally require a verified email
/// (checkout and order endpoints).
#[derive(Debug, Clone)]
pub struct Verified(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for Verified {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_verified {
            return Err(AppError::EmailNotVerified);
        }
        Ok(Self(user))
    }
}
