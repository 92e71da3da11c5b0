//! Signed session cookie and request extractors
//!
//! The session lives entirely in the `clp_session` cookie: an HMAC-signed
//! token carrying the user id, role, username and the auth provider's
//! access token.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use clp_common::models::Role;
use clp_common::signing;
use clp_common::time::now;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const SESSION_COOKIE: &str = "clp_session";

/// Session lifetime
pub const SESSION_TTL_SECS: i64 = 12 * 60 * 60;

pub const LOGIN_REQUIRED: &str = "You must be logged in to view this page.";
pub const FORBIDDEN: &str = "You do not have permission to access this page.";

/// Logged-in user as recorded at sign-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub role: String,
    pub username: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Session {
    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }

    /// 403 unless the session role is one of `roles`
    pub fn require_role(&self, roles: &[Role]) -> ApiResult<Role> {
        match self.role() {
            Some(role) if roles.contains(&role) => Ok(role),
            _ => Err(ApiError::Forbidden(FORBIDDEN.to_string())),
        }
    }
}

/// `Set-Cookie` value establishing the session
pub fn session_cookie(session: &Session, secret: &str) -> ApiResult<String> {
    let token = signing::sign(session, secret, SESSION_TTL_SECS, now())?;
    Ok(format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, SESSION_TTL_SECS
    ))
}

/// `Set-Cookie` value removing the session
pub fn clear_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// Value of a cookie from the `Cookie` headers
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Decode the session cookie; invalid or expired cookies count as absent
pub fn read_session(headers: &HeaderMap, secret: &str) -> Option<Session> {
    let token = cookie_value(headers, SESSION_COOKIE)?;
    match signing::verify(token, secret, now()) {
        Ok(session) => Some(session),
        Err(e) => {
            debug!("Ignoring session cookie: {}", e);
            None
        }
    }
}

/// Extractor requiring a logged-in user (401 otherwise)
pub struct CurrentUser(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        read_session(&parts.headers, &state.settings.secret_key)
            .map(CurrentUser)
            .ok_or_else(|| ApiError::Unauthorized(LOGIN_REQUIRED.to_string()))
    }
}

/// Extractor for routes open to anonymous visitors
pub struct MaybeUser(pub Option<Session>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(read_session(&parts.headers, &state.settings.secret_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn session(role: &str) -> Session {
        Session {
            user_id: "u1".to_string(),
            role: role.to_string(),
            username: "anacruz".to_string(),
            access_token: Some("tok".to_string()),
        }
    }

    #[test]
    fn test_cookie_roundtrip() {
        let set_cookie = session_cookie(&session("teacher"), "secret").unwrap();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));

        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&format!("theme=dark; {}", pair)).unwrap());
        assert_eq!(read_session(&headers, "secret"), Some(session("teacher")));
        assert_eq!(read_session(&headers, "other-secret"), None);
    }

    #[test]
    fn test_require_role() {
        assert_eq!(session("dean").require_role(&[Role::Teacher, Role::Dean]).unwrap(), Role::Dean);
        assert!(matches!(
            session("teacher").require_role(&[Role::Admin]),
            Err(ApiError::Forbidden(_))
        ));
        assert!(session("registrar").require_role(&[Role::Teacher]).is_err());
    }

    #[test]
    fn test_cookie_value_missing() {
        let headers = HeaderMap::new();
        assert_eq!(cookie_value(&headers, SESSION_COOKIE), None);
    }
}
