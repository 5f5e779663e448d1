//! Request identity and user profiles
//!
//! Sign-in happens at the identity provider in front of this service; requests
//! arrive with the authenticated uid in the `X-User-Id` header.

mod profile;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub use profile::{ProfileRepository, ProfileUpdate, UserProfile, AVATARS};

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
}

impl AuthUser {
    /// Validate a uid taken from a header or a request body
    pub fn from_uid(uid: Option<&str>) -> Result<Self, AppError> {
        let uid = uid
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Unauthorized("User must be authenticated".to_string()))?;

        // The uid becomes part of object keys.
        let valid = uid.len() <= 128
            && uid
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::Unauthorized("Invalid user id".to_string()));
        }

        Ok(Self { uid: uid.to_string() })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok());
        AuthUser::from_uid(header)
    }
}
