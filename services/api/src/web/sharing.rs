//! services/api/src/web/sharing.rs
//!
//! Shareable links for passages and reading progress. Reading a share is
//! public; everything else needs a session.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use visnovel_core::domain::{
    AuthUser, NewSharedContent, ProgressStats, ShareKind, SharedContent, SharedContentView,
};
use visnovel_core::ports::PortError;

use crate::web::middleware::optional_user;
use crate::web::rest::{
    checked_page, http_error, load_novel, message, port_error, Access, HttpError, MessageBody,
};
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SharePassageRequest {
    pub content: Option<String>,
    pub page: Option<i64>,
    /// A generated illustration to attach.
    pub image_id: Option<Uuid>,
    /// Hours until the link stops working.
    pub expires_in: Option<i64>,
    #[serde(default = "public_by_default")]
    pub is_public: bool,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareProgressRequest {
    pub expires_in: Option<i64>,
    #[serde(default = "public_by_default")]
    pub is_public: bool,
}

impl Default for ShareProgressRequest {
    fn default() -> Self {
        Self {
            expires_in: None,
            is_public: true,
        }
    }
}

fn public_by_default() -> bool {
    true
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedViewResponse {
    pub shared_content: SharedContentView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedListResponse {
    pub shared_content: Vec<SharedContentView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedCreatedResponse {
    pub shared_content: SharedContent,
}

/// Sixteen lowercase hex characters.
fn new_share_id() -> String {
    format!("{:016x}", Uuid::new_v4().as_u128() as u64)
}

fn share_url(frontend_url: &str, share_id: &str) -> String {
    format!("{}/share/{}", frontend_url.trim_end_matches('/'), share_id)
}

/// A positive number of hours sets an expiry; anything else never expires.
fn expiry(now: DateTime<Utc>, expires_in_hours: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in_hours
        .filter(|hours| *hours > 0)
        .and_then(Duration::try_hours)
        .and_then(|d| now.checked_add_signed(d))
}

#[utoipa::path(
    get,
    path = "/api/share/{share_id}",
    params(("share_id" = String, Path, description = "Public share id")),
    responses(
        (status = 200, description = "The shared passage or progress card"),
        (status = 403, description = "Private share of another user", body = MessageBody),
        (status = 404, description = "Unknown share", body = MessageBody),
        (status = 410, description = "Share has expired", body = MessageBody)
    )
)]
pub async fn get_shared_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(share_id): Path<String>,
) -> Result<Json<SharedViewResponse>, HttpError> {
    let shared = state
        .db
        .get_shared_content(&share_id)
        .await
        .map_err(|e| port_error(e, "Shared content"))?;

    if shared.content.is_expired(Utc::now()) {
        return Err(http_error(StatusCode::GONE, "This shared content has expired"));
    }
    let viewer = optional_user(&state, &headers).await;
    if !shared.content.visible_to(viewer.as_ref()) {
        return Err(http_error(
            StatusCode::FORBIDDEN,
            "You do not have permission to view this content",
        ));
    }
    Ok(Json(SharedViewResponse {
        shared_content: shared,
    }))
}

#[utoipa::path(
    get,
    path = "/api/share/user/all",
    responses((status = 200, description = "The caller's shares, newest first"))
)]
pub async fn list_my_shares_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SharedListResponse>, HttpError> {
    let shared_content = state
        .db
        .list_shared_by_user(user.user_id)
        .await
        .map_err(|e| port_error(e, "Shared content"))?;
    Ok(Json(SharedListResponse { shared_content }))
}

#[utoipa::path(
    post,
    path = "/api/share/novels/{novel_id}/passage",
    params(("novel_id" = Uuid, Path, description = "Novel id")),
    request_body = SharePassageRequest,
    responses(
        (status = 201, description = "Share created"),
        (status = 400, description = "Content and page are required", body = MessageBody),
        (status = 403, description = "No access to the novel", body = MessageBody)
    )
)]
pub async fn share_passage_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(novel_id): Path<Uuid>,
    Json(req): Json<SharePassageRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let required = || http_error(StatusCode::BAD_REQUEST, "Content and page are required");
    let content = req
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(required)?;
    let page = req.page.ok_or_else(required)?;

    let novel = load_novel(&state, novel_id, &user, Access::Read).await?;
    let page = checked_page(&novel, page)?;

    let image_url = match req.image_id {
        None => None,
        Some(image_id) => match state.db.get_image_log(image_id).await {
            Ok(image) => Some(image.image_url),
            Err(PortError::NotFound(_)) => {
                warn!(%image_id, "Shared passage names an unknown image");
                None
            }
            Err(e) => return Err(port_error(e, "Image")),
        },
    };

    let share_id = new_share_id();
    let shared_content = state
        .db
        .create_shared_content(NewSharedContent {
            share_url: share_url(&state.config.frontend_url, &share_id),
            share_id,
            kind: ShareKind::Passage,
            user_id: user.user_id,
            novel_id: novel.id,
            content: Some(content),
            page: Some(page),
            image_url,
            stats: None,
            expires_at: expiry(Utc::now(), req.expires_in),
            is_public: req.is_public,
        })
        .await
        .map_err(|e| port_error(e, "Shared content"))?;

    info!(share_id = %shared_content.share_id, novel_id = %novel.id, "Shared passage");
    Ok((
        StatusCode::CREATED,
        Json(SharedCreatedResponse { shared_content }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/share/novels/{novel_id}/progress",
    params(("novel_id" = Uuid, Path, description = "Novel id")),
    request_body = ShareProgressRequest,
    responses(
        (status = 201, description = "Progress card created"),
        (status = 403, description = "Not the owner of the novel", body = MessageBody)
    )
)]
pub async fn share_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(novel_id): Path<Uuid>,
    body: Option<Json<ShareProgressRequest>>,
) -> Result<impl IntoResponse, HttpError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let novel = load_novel(&state, novel_id, &user, Access::Modify).await?;

    let share_id = new_share_id();
    let shared_content = state
        .db
        .create_shared_content(NewSharedContent {
            share_url: share_url(&state.config.frontend_url, &share_id),
            share_id,
            kind: ShareKind::Progress,
            user_id: user.user_id,
            novel_id: novel.id,
            content: None,
            page: None,
            image_url: None,
            stats: Some(ProgressStats::from(&novel)),
            expires_at: expiry(Utc::now(), req.expires_in),
            is_public: req.is_public,
        })
        .await
        .map_err(|e| port_error(e, "Shared content"))?;

    info!(share_id = %shared_content.share_id, novel_id = %novel.id, "Shared reading progress");
    Ok((
        StatusCode::CREATED,
        Json(SharedCreatedResponse { shared_content }),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/share/{share_id}",
    params(("share_id" = String, Path, description = "Public share id")),
    responses(
        (status = 200, description = "Share deleted", body = MessageBody),
        (status = 403, description = "Neither the author nor an admin", body = MessageBody),
        (status = 404, description = "Unknown share", body = MessageBody)
    )
)]
pub async fn delete_shared_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(share_id): Path<String>,
) -> Result<Json<MessageBody>, HttpError> {
    let shared = state
        .db
        .get_shared_content(&share_id)
        .await
        .map_err(|e| port_error(e, "Shared content"))?;
    if shared.content.user_id != user.user_id && !user.is_admin() {
        return Err(http_error(
            StatusCode::FORBIDDEN,
            "Not authorized to delete this shared content",
        ));
    }

    state
        .db
        .delete_shared_content(&share_id)
        .await
        .map_err(|e| port_error(e, "Shared content"))?;
    Ok(message("Shared content deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_ids_are_sixteen_hex_chars() {
        let id = new_share_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, new_share_id());
    }

    #[test]
    fn share_urls_do_not_double_slashes() {
        assert_eq!(share_url("https://reader.example/", "ab12"), "https://reader.example/share/ab12");
        assert_eq!(share_url("http://localhost:5173", "ab12"), "http://localhost:5173/share/ab12");
    }

    #[test]
    fn expiry_counts_hours_from_now() {
        let now = Utc::now();
        assert_eq!(expiry(now, Some(24)), Some(now + Duration::hours(24)));
        assert_eq!(expiry(now, None), None);
        assert_eq!(expiry(now, Some(0)), None);
        assert_eq!(expiry(now, Some(-3)), None);
    }

    #[test]
    fn shares_are_public_unless_asked_otherwise() {
        let req: SharePassageRequest =
            serde_json::from_str(r#"{"content":"The sea rose.","page":4}"#).unwrap();
        assert!(req.is_public);
        assert_eq!(req.expires_in, None);

        let req: ShareProgressRequest =
            serde_json::from_str(r#"{"isPublic":false,"expiresIn":48}"#).unwrap();
        assert!(!req.is_public);
        assert_eq!(req.expires_in, Some(48));
    }
}
