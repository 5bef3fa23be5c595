//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;
use visnovel_core::domain::Role;
use visnovel_core::ports::PortError;

use crate::web::middleware::session_cookie;
use crate::web::rest::{http_error, message, port_error, HttpError, MessageBody};
use crate::web::state::AppState;

const SESSION_DAYS: i64 = 30;
const MIN_PASSWORD_LEN: usize = 6;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    #[schema(value_type = String)]
    pub role: Role,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn validate_signup(req: &SignupRequest) -> Result<(), HttpError> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(http_error(
            StatusCode::BAD_REQUEST,
            "Please provide name, email and password",
        ));
    }
    if !EMAIL.is_match(req.email.trim()) {
        return Err(http_error(StatusCode::BAD_REQUEST, "Please provide a valid email"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(http_error(
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

/// Creates an auth session and returns the `Set-Cookie` value for it.
async fn start_session(state: &AppState, user_id: Uuid) -> Result<String, HttpError> {
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);

    state
        .db
        .create_auth_session(&auth_session_id, user_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            http_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session")
        })?;

    Ok(format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        auth_session_id,
        Duration::days(SESSION_DAYS).num_seconds()
    ))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request or email already registered", body = MessageBody),
        (status = 500, description = "Internal server error", body = MessageBody)
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, HttpError> {
    validate_signup(&req)?;

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            http_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password")
        })?
        .to_string();

    // 2. Create user in database
    let email = req.email.trim().to_lowercase();
    let user = state
        .db
        .create_user(req.name.trim(), &email, &password_hash)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => http_error(StatusCode::BAD_REQUEST, "User already exists"),
            other => port_error(other, "User"),
        })?;
    info!(user_id = %user.id, "Registered new user");

    // 3. Log the new user in
    let cookie = start_session(&state, user.id).await?;

    let response = AuthResponse {
        user_id: user.id,
        name: user.name,
        email: user.email,
        role: user.role,
    };
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = MessageBody),
        (status = 500, description = "Internal server error", body = MessageBody)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let invalid = || http_error(StatusCode::UNAUTHORIZED, "Invalid email or password");

    // 1. Get user by email
    let user_creds = state
        .db
        .get_user_credentials(&req.email.trim().to_lowercase())
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => invalid(),
            other => port_error(other, "User"),
        })?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        http_error(StatusCode::INTERNAL_SERVER_ERROR, "Authentication error")
    })?;

    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();
    if !valid {
        return Err(invalid());
    }

    // 3. Start a session
    let cookie = start_session(&state, user_creds.user_id).await?;

    let response = AuthResponse {
        user_id: user_creds.user_id,
        name: user_creds.name,
        email: user_creds.email,
        role: user_creds.role,
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logout successful", body = MessageBody),
        (status = 401, description = "No active session", body = MessageBody)
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpError> {
    let auth_session_id = session_cookie(&headers)
        .ok_or_else(|| http_error(StatusCode::UNAUTHORIZED, "No session found"))?;

    state
        .db
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            http_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout")
        })?;

    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie.to_string())],
        message("Logged out successfully"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(name: &str, email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn signup_requires_every_field() {
        assert!(validate_signup(&signup("Ada", "ada@example.com", "secret1")).is_ok());
        let (status, body) = validate_signup(&signup("  ", "ada@example.com", "secret1")).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.message, "Please provide name, email and password");
    }

    #[test]
    fn signup_checks_email_and_password_shape() {
        let (_, body) = validate_signup(&signup("Ada", "not-an-email", "secret1")).unwrap_err();
        assert_eq!(body.message, "Please provide a valid email");
        let (_, body) = validate_signup(&signup("Ada", "ada@example.com", "123")).unwrap_err();
        assert_eq!(body.message, "Password must be at least 6 characters");
    }
}
