//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};
use visnovel_core::domain::AuthUser;
use visnovel_core::ports::PortError;

use crate::web::rest::{http_error, HttpError};
use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Extracts the auth session id from the `Cookie` header.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
        })
}

/// Resolves the caller of a public route, if they sent a valid session.
pub async fn optional_user(state: &AppState, headers: &HeaderMap) -> Option<AuthUser> {
    let session_id = session_cookie(headers)?;
    match state.db.validate_auth_session(session_id).await {
        Ok(user) => Some(user),
        Err(e) => {
            debug!("Ignoring invalid session on public route: {}", e);
            None
        }
    }
}

/// Middleware that validates the auth session cookie and resolves the caller.
///
/// If valid, inserts the `AuthUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let unauthorized = || http_error(StatusCode::UNAUTHORIZED, "Not authorized, no valid session");

    let auth_session_id = session_cookie(req.headers()).ok_or_else(unauthorized)?;

    let user = state
        .db
        .validate_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            if !matches!(e, PortError::Unauthorized) {
                warn!("Failed to validate auth session: {:?}", e);
            }
            unauthorized()
        })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Middleware for admin-only routes. Must run after `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, HttpError> {
    match req.extensions().get::<AuthUser>() {
        Some(user) if user.is_admin() => Ok(next.run(req).await),
        Some(_) => Err(http_error(StatusCode::FORBIDDEN, "Not authorized as an admin")),
        None => Err(http_error(StatusCode::UNAUTHORIZED, "Not authorized, no valid session")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn finds_the_session_among_other_cookies() {
        let headers = with_cookie("theme=dark; session=abc-123; lang=en");
        assert_eq!(session_cookie(&headers), Some("abc-123"));
    }

    #[test]
    fn ignores_lookalike_and_empty_cookies() {
        assert_eq!(session_cookie(&with_cookie("old_session=abc")), None);
        assert_eq!(session_cookie(&with_cookie("session=")), None);
        assert_eq!(session_cookie(&HeaderMap::new()), None);
    }
}
