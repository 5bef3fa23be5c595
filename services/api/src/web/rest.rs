//! services/api/src/web/rest.rs
//!
//! Shared pieces of the REST layer: the master definition for the OpenAPI
//! specification, the JSON error body, and the lookups most handlers start with.

use crate::web::state::AppState;
use crate::web::{annotations, auth, images, novels, sharing, users};
use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;
use visnovel_core::domain::{AuthUser, Novel};
use visnovel_core::ports::PortError;
use visnovel_core::PaginationError;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        novels::upload_novel_handler,
        novels::list_novels_handler,
        novels::get_novel_handler,
        novels::get_page_handler,
        novels::delete_novel_handler,
        novels::add_bookmark_handler,
        novels::remove_bookmark_handler,
        novels::add_note_handler,
        novels::update_note_handler,
        novels::delete_note_handler,
        novels::update_progress_handler,
        novels::admin_list_novels_handler,
        annotations::list_annotations_handler,
        annotations::list_page_annotations_handler,
        annotations::create_annotation_handler,
        annotations::update_annotation_handler,
        annotations::delete_annotation_handler,
        images::generate_image_handler,
        images::list_page_images_handler,
        images::list_image_logs_handler,
        sharing::get_shared_handler,
        sharing::list_my_shares_handler,
        sharing::share_passage_handler,
        sharing::share_progress_handler,
        sharing::delete_shared_handler,
        users::get_profile_handler,
        users::update_profile_handler,
        users::get_stats_handler,
        users::update_stats_handler,
        users::get_preferences_handler,
        users::update_preferences_handler,
        users::list_users_handler,
        users::delete_user_handler,
    ),
    components(
        schemas(
            MessageBody,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            novels::BookmarkRequest,
            novels::NoteRequest,
            novels::ProgressRequest,
            annotations::CreateAnnotationRequest,
            annotations::UpdateAnnotationRequest,
            images::GenerateImageRequest,
            sharing::SharePassageRequest,
            sharing::ShareProgressRequest,
            users::ProfileRequest,
            users::StatsRequest,
            users::PreferencesRequest,
        )
    ),
    tags(
        (name = "Visual Novel Reader API", description = "Novels, pagination, annotations, illustrations and sharing.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Errors
//=========================================================================================

/// Every error response carries a single human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageBody {
    pub message: String,
}

pub type HttpError = (StatusCode, Json<MessageBody>);

pub fn http_error(status: StatusCode, message: impl Into<String>) -> HttpError {
    (
        status,
        Json(MessageBody {
            message: message.into(),
        }),
    )
}

pub fn message(text: impl Into<String>) -> Json<MessageBody> {
    Json(MessageBody {
        message: text.into(),
    })
}

/// Maps a port failure onto a response. `what` names the missing item.
pub fn port_error(e: PortError, what: &str) -> HttpError {
    match e {
        PortError::NotFound(_) => http_error(StatusCode::NOT_FOUND, format!("{} not found", what)),
        PortError::Conflict(reason) => http_error(StatusCode::BAD_REQUEST, reason),
        PortError::Unauthorized => http_error(StatusCode::UNAUTHORIZED, "Not authorized"),
        PortError::Unexpected(reason) => {
            error!("Unexpected failure while handling {}: {}", what, reason);
            http_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}

pub fn pagination_error(e: PaginationError) -> HttpError {
    match e {
        PaginationError::InvalidPageNumber { .. } => {
            http_error(StatusCode::BAD_REQUEST, "Invalid page number")
        }
        PaginationError::Io(reason) => {
            error!("Novel file could not be read: {}", reason);
            http_error(StatusCode::INTERNAL_SERVER_ERROR, "Novel file could not be read")
        }
        PaginationError::DocumentParse(reason) => {
            error!("Novel file could not be parsed: {}", reason);
            http_error(StatusCode::INTERNAL_SERVER_ERROR, "Error reading novel content")
        }
    }
}

//=========================================================================================
// Shared lookups
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Owner or admin.
    Read,
    /// Owner only.
    Modify,
}

/// Loads a novel and checks the caller may use it as requested.
pub async fn load_novel(
    state: &AppState,
    novel_id: Uuid,
    user: &AuthUser,
    access: Access,
) -> Result<Novel, HttpError> {
    let novel = state
        .db
        .get_novel(novel_id)
        .await
        .map_err(|e| port_error(e, "Novel"))?;

    let allowed = match access {
        Access::Read => novel.readable_by(user),
        Access::Modify => novel.modifiable_by(user),
    };
    if !allowed {
        return Err(http_error(
            StatusCode::FORBIDDEN,
            "Not authorized to access this novel",
        ));
    }
    Ok(novel)
}

/// Validates a 1-based page number against the novel's page count.
pub fn checked_page(novel: &Novel, page: i64) -> Result<i32, HttpError> {
    if !novel.is_valid_page(page) {
        return Err(http_error(StatusCode::BAD_REQUEST, "Invalid page number"));
    }
    i32::try_from(page).map_err(|_| http_error(StatusCode::BAD_REQUEST, "Invalid page number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use visnovel_core::domain::DocumentKind;

    fn novel(total_pages: i32) -> Novel {
        let now = Utc::now();
        Novel {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Tides".to_string(),
            file_path: "uploads/novels/tides.txt".to_string(),
            file_type: DocumentKind::Text,
            total_pages,
            bookmarks: Vec::new(),
            notes: Vec::new(),
            last_read_page: 1,
            total_reading_time: 0,
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn port_errors_map_to_statuses() {
        let (status, body) = port_error(PortError::NotFound("row".into()), "Novel");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.message, "Novel not found");

        let (status, body) = port_error(PortError::Conflict("Bookmark already exists for this page".into()), "Bookmark");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.message, "Bookmark already exists for this page");

        let (status, _) = port_error(PortError::Unexpected("pool closed".into()), "Novel");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn pagination_errors_map_to_statuses() {
        let (status, _) = pagination_error(PaginationError::InvalidPageNumber { page: 9, total_pages: 3 });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = pagination_error(PaginationError::DocumentParse("bad zip".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "Error reading novel content");
    }

    #[test]
    fn pages_are_checked_against_the_novel() {
        let novel = novel(3);
        assert_eq!(checked_page(&novel, 3).unwrap(), 3);
        assert_eq!(checked_page(&novel, 0).unwrap_err().0, StatusCode::BAD_REQUEST);
        assert_eq!(checked_page(&novel, 4).unwrap_err().0, StatusCode::BAD_REQUEST);
    }
}
