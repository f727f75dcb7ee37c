use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::roles::{self, Role},
    error::ApiError,
    state::AppState,
};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "token";

/// Authenticated caller resolved from the session token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Fails with `Forbidden` unless the caller's role is in `allowed`.
    pub fn authorize(&self, allowed: &[Role]) -> Result<(), ApiError> {
        roles::authorize(self.role, allowed).inspect_err(|_| {
            warn!(user_id = %self.user_id, role = %self.role, "role not allowed");
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(ApiError::Unauthenticated)?;

        let claims = state.jwt.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            ApiError::Unauthenticated
        })?;

        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

/// Bearer token from `Authorization`, falling back to the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| {
            auth.strip_prefix("Bearer ")
                .or_else(|| auth.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|v| !v.is_empty() && *v != "none")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(session_token(&headers), Some("abc"));
    }

    #[test]
    fn falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=xyz; other=1"),
        );
        assert_eq!(session_token(&headers), Some("xyz"));
    }

    #[test]
    fn ignores_cleared_cookie_and_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("token=none"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(session_token(&headers), None);
    }
}
