//! services/api/src/web/novels.rs
//!
//! Novel library endpoints: uploads, paginated reading, bookmarks, notes and
//! reading progress.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use visnovel_core::domain::{
    AuthUser, Bookmark, DocumentKind, NewNovel, Novel, NovelWithOwner, ProgressUpdate,
    ReaderNote, ReadingStatsDelta,
};
use visnovel_core::pagination::ChapterPosition;

use crate::web::rest::{
    checked_page, http_error, load_novel, message, pagination_error, port_error, Access,
    HttpError, MessageBody,
};
use crate::web::state::AppState;

const MAX_TITLE_CHARS: usize = 100;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize)]
pub struct NovelResponse {
    pub novel: Novel,
}

#[derive(Serialize)]
pub struct NovelsResponse {
    pub novels: Vec<Novel>,
}

#[derive(Serialize)]
pub struct AdminNovelsResponse {
    pub novels: Vec<NovelWithOwner>,
}

#[derive(Serialize)]
pub struct BookmarksResponse {
    pub bookmarks: Vec<Bookmark>,
}

#[derive(Serialize)]
pub struct NotesResponse {
    pub notes: Vec<ReaderNote>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub is_html: bool,
    #[serde(flatten)]
    pub chapter: Option<ChapterPosition>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub page: i32,
    pub content: String,
    pub total_pages: i32,
    pub metadata: PageMetadata,
}

#[derive(Deserialize, ToSchema)]
pub struct BookmarkRequest {
    pub page: i64,
    pub name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct NoteRequest {
    pub page: Option<i64>,
    pub content: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub page: Option<i64>,
    /// Minutes read since the last update.
    pub reading_time: Option<i64>,
    pub completed: Option<bool>,
}

//=========================================================================================
// Upload
//=========================================================================================

struct UploadedFile {
    file_name: String,
    bytes: Vec<u8>,
}

async fn read_upload(
    multipart: &mut Multipart,
) -> Result<(Option<String>, Option<UploadedFile>), HttpError> {
    let mut title = None;
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        http_error(
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        match field.name() {
            Some("title") => {
                let text = field.text().await.map_err(|e| {
                    http_error(StatusCode::BAD_REQUEST, format!("Invalid title field: {}", e))
                })?;
                title = Some(text);
            }
            Some("novel") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(|e| {
                    http_error(
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read file bytes: {}", e),
                    )
                })?;
                file = Some(UploadedFile {
                    file_name,
                    bytes: data.to_vec(),
                });
            }
            _ => {}
        }
    }
    Ok((title, file))
}

fn validate_title(title: Option<String>) -> Result<String, HttpError> {
    let title = title.map(|t| t.trim().to_string()).unwrap_or_default();
    if title.is_empty() {
        return Err(http_error(StatusCode::BAD_REQUEST, "Title is required"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(http_error(
            StatusCode::BAD_REQUEST,
            format!("Title cannot exceed {} characters", MAX_TITLE_CHARS),
        ));
    }
    Ok(title)
}

fn stored_file_name(kind: DocumentKind) -> String {
    format!(
        "{}-{}.{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        kind.as_str()
    )
}

/// Removes a stored file after a failed upload; the original error wins.
async fn discard(state: &AppState, path: &FsPath) {
    if let Err(e) = state.store.remove(path).await {
        warn!(path = %path.display(), "Failed to clean up upload: {}", e);
    }
}

/// Upload a novel.
///
/// Accepts a multipart/form-data request with a `title` text part and a
/// `novel` file part (`.txt` or `.epub`).
#[utoipa::path(
    post,
    path = "/api/novels",
    request_body(content_type = "multipart/form-data", description = "`title` and the `novel` file."),
    responses(
        (status = 201, description = "Novel uploaded and paginated"),
        (status = 400, description = "Missing title or file, or unsupported file type", body = MessageBody),
        (status = 500, description = "Internal server error", body = MessageBody)
    )
)]
pub async fn upload_novel_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let (title, file) = read_upload(&mut multipart).await?;
    let file = file.ok_or_else(|| http_error(StatusCode::BAD_REQUEST, "No file uploaded"))?;
    let title = validate_title(title)?;
    let kind = DocumentKind::from_file_name(&file.file_name).ok_or_else(|| {
        http_error(
            StatusCode::BAD_REQUEST,
            "Only .txt and .epub files are allowed!",
        )
    })?;

    let path: PathBuf = state.config.novels_dir().join(stored_file_name(kind));
    state
        .store
        .write(&path, &file.bytes)
        .await
        .map_err(|e| port_error(e, "Upload"))?;

    let total_pages = match state.paginator.upload_page_count(&path, kind).await {
        Ok(count) => i32::try_from(count).unwrap_or(i32::MAX),
        Err(e) => {
            discard(&state, &path).await;
            return Err(pagination_error(e));
        }
    };

    let created = state
        .db
        .create_novel(NewNovel {
            owner_id: user.user_id,
            title,
            file_path: path.to_string_lossy().into_owned(),
            file_type: kind,
            total_pages,
        })
        .await;
    let novel = match created {
        Ok(novel) => novel,
        Err(e) => {
            discard(&state, &path).await;
            return Err(port_error(e, "Novel"));
        }
    };

    info!(
        novel_id = %novel.id,
        original_name = %file.file_name,
        file_type = kind.as_str(),
        total_pages,
        "Novel uploaded"
    );
    Ok((StatusCode::CREATED, Json(NovelResponse { novel })))
}

//=========================================================================================
// Library and reading
//=========================================================================================

/// List the caller's novels, newest first.
#[utoipa::path(
    get,
    path = "/api/novels",
    responses((status = 200, description = "The caller's novels"))
)]
pub async fn list_novels_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<NovelsResponse>, HttpError> {
    let novels = state
        .db
        .list_novels_by_owner(user.user_id)
        .await
        .map_err(|e| port_error(e, "Novels"))?;
    Ok(Json(NovelsResponse { novels }))
}

#[utoipa::path(
    get,
    path = "/api/novels/{id}",
    params(("id" = Uuid, Path, description = "Novel id")),
    responses(
        (status = 200, description = "The novel"),
        (status = 403, description = "Not the owner or an admin", body = MessageBody),
        (status = 404, description = "Novel not found", body = MessageBody)
    )
)]
pub async fn get_novel_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<NovelResponse>, HttpError> {
    let novel = load_novel(&state, id, &user, Access::Read).await?;
    Ok(Json(NovelResponse { novel }))
}

/// Read one page of a novel.
///
/// Text pages are exact slices of the file. EPUB pages return the markup of
/// the chapter holding the page plus the word window to show inside it.
#[utoipa::path(
    get,
    path = "/api/novels/{id}/page/{page}",
    params(
        ("id" = Uuid, Path, description = "Novel id"),
        ("page" = i64, Path, description = "1-based page number")
    ),
    responses(
        (status = 200, description = "Page content with chapter metadata"),
        (status = 400, description = "Invalid page number", body = MessageBody),
        (status = 404, description = "Novel not found", body = MessageBody),
        (status = 500, description = "Novel file could not be read", body = MessageBody)
    )
)]
pub async fn get_page_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((id, page)): Path<(Uuid, i64)>,
) -> Result<Json<PageResponse>, HttpError> {
    let novel = load_novel(&state, id, &user, Access::Read).await?;
    let page_number = checked_page(&novel, page)?;

    let resolved = state
        .paginator
        .page(FsPath::new(&novel.file_path), novel.file_type, page_number as usize)
        .await
        .map_err(pagination_error)?;

    // Admins browsing someone else's novel do not move their bookmark.
    if novel.modifiable_by(&user) {
        if let Err(e) = state.db.set_last_read_page(novel.id, page_number).await {
            error!(novel_id = %novel.id, "Failed to persist last read page: {}", e);
        }
    }

    Ok(Json(PageResponse {
        page: page_number,
        content: resolved.content,
        total_pages: novel.total_pages,
        metadata: PageMetadata {
            is_html: resolved.is_html,
            chapter: resolved.chapter,
        },
    }))
}

/// Delete a novel and its stored file.
#[utoipa::path(
    delete,
    path = "/api/novels/{id}",
    params(("id" = Uuid, Path, description = "Novel id")),
    responses(
        (status = 200, description = "Novel deleted", body = MessageBody),
        (status = 403, description = "Not the owner or an admin", body = MessageBody),
        (status = 404, description = "Novel not found", body = MessageBody)
    )
)]
pub async fn delete_novel_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageBody>, HttpError> {
    let novel = load_novel(&state, id, &user, Access::Read).await?;
    state
        .db
        .delete_novel(novel.id)
        .await
        .map_err(|e| port_error(e, "Novel"))?;

    let path = FsPath::new(&novel.file_path);
    state.paginator.forget(path).await;
    if let Err(e) = state.store.remove(path).await {
        warn!(novel_id = %novel.id, "Failed to remove novel file: {}", e);
    }
    info!(novel_id = %novel.id, "Novel deleted");
    Ok(message("Novel deleted successfully"))
}

//=========================================================================================
// Bookmarks and notes
//=========================================================================================

#[utoipa::path(
    post,
    path = "/api/novels/{id}/bookmarks",
    params(("id" = Uuid, Path, description = "Novel id")),
    request_body = BookmarkRequest,
    responses(
        (status = 200, description = "All bookmarks of the novel"),
        (status = 400, description = "Invalid page or duplicate bookmark", body = MessageBody)
    )
)]
pub async fn add_bookmark_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<BookmarkRequest>,
) -> Result<Json<BookmarksResponse>, HttpError> {
    let novel = load_novel(&state, id, &user, Access::Modify).await?;
    let page = checked_page(&novel, req.page)?;
    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("Page {}", page));

    let bookmarks = state
        .db
        .add_bookmark(novel.id, page, &name)
        .await
        .map_err(|e| port_error(e, "Bookmark"))?;
    Ok(Json(BookmarksResponse { bookmarks }))
}

#[utoipa::path(
    delete,
    path = "/api/novels/{id}/bookmarks/{bookmark_id}",
    params(
        ("id" = Uuid, Path, description = "Novel id"),
        ("bookmark_id" = Uuid, Path, description = "Bookmark id")
    ),
    responses((status = 200, description = "Remaining bookmarks of the novel"))
)]
pub async fn remove_bookmark_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((id, bookmark_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<BookmarksResponse>, HttpError> {
    let novel = load_novel(&state, id, &user, Access::Modify).await?;
    let bookmarks = state
        .db
        .remove_bookmark(novel.id, bookmark_id)
        .await
        .map_err(|e| port_error(e, "Bookmark"))?;
    Ok(Json(BookmarksResponse { bookmarks }))
}

fn note_content(content: &str) -> Result<&str, HttpError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(http_error(StatusCode::BAD_REQUEST, "Note content is required"));
    }
    Ok(content)
}

#[utoipa::path(
    post,
    path = "/api/novels/{id}/notes",
    params(("id" = Uuid, Path, description = "Novel id")),
    request_body = NoteRequest,
    responses(
        (status = 200, description = "All notes of the novel"),
        (status = 400, description = "Invalid page or empty note", body = MessageBody)
    )
)]
pub async fn add_note_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<NotesResponse>, HttpError> {
    let novel = load_novel(&state, id, &user, Access::Modify).await?;
    let page = checked_page(&novel, req.page.unwrap_or(0))?;
    let content = note_content(&req.content)?;

    let notes = state
        .db
        .add_note(novel.id, page, content)
        .await
        .map_err(|e| port_error(e, "Note"))?;
    Ok(Json(NotesResponse { notes }))
}

#[utoipa::path(
    patch,
    path = "/api/novels/{id}/notes/{note_id}",
    params(
        ("id" = Uuid, Path, description = "Novel id"),
        ("note_id" = Uuid, Path, description = "Note id")
    ),
    request_body = NoteRequest,
    responses(
        (status = 200, description = "All notes of the novel"),
        (status = 404, description = "Note not found", body = MessageBody)
    )
)]
pub async fn update_note_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((id, note_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<NotesResponse>, HttpError> {
    let novel = load_novel(&state, id, &user, Access::Modify).await?;
    let content = note_content(&req.content)?;
    let notes = state
        .db
        .update_note(novel.id, note_id, content)
        .await
        .map_err(|e| port_error(e, "Note"))?;
    Ok(Json(NotesResponse { notes }))
}

#[utoipa::path(
    delete,
    path = "/api/novels/{id}/notes/{note_id}",
    params(
        ("id" = Uuid, Path, description = "Novel id"),
        ("note_id" = Uuid, Path, description = "Note id")
    ),
    responses((status = 200, description = "Remaining notes of the novel"))
)]
pub async fn delete_note_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((id, note_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<NotesResponse>, HttpError> {
    let novel = load_novel(&state, id, &user, Access::Modify).await?;
    let notes = state
        .db
        .delete_note(novel.id, note_id)
        .await
        .map_err(|e| port_error(e, "Note"))?;
    Ok(Json(NotesResponse { notes }))
}

//=========================================================================================
// Progress
//=========================================================================================

/// Splits a progress request into the novel update and the reader's stat increments.
fn plan_progress(novel: &Novel, req: &ProgressRequest) -> (ProgressUpdate, ReadingStatsDelta) {
    let reading_time = req.reading_time.filter(|minutes| *minutes > 0);
    let newly_completed = req.completed == Some(true) && !novel.completed;

    let update = ProgressUpdate {
        last_read_page: req
            .page
            .filter(|page| novel.is_valid_page(*page))
            .and_then(|page| i32::try_from(page).ok()),
        add_reading_time: reading_time,
        completed: req.completed,
    };
    let delta = ReadingStatsDelta {
        reading_time: reading_time.unwrap_or(0),
        pages_read: i64::from(reading_time.is_some()),
        novels_completed: i64::from(newly_completed),
        images_generated: 0,
    };
    (update, delta)
}

/// Record reading progress.
///
/// Reading time also counts towards the reader's statistics, and finishing a
/// novel for the first time increments their completed count.
#[utoipa::path(
    patch,
    path = "/api/novels/{id}/progress",
    params(("id" = Uuid, Path, description = "Novel id")),
    request_body = ProgressRequest,
    responses(
        (status = 200, description = "The updated novel"),
        (status = 403, description = "Not the owner", body = MessageBody)
    )
)]
pub async fn update_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<NovelResponse>, HttpError> {
    let novel = load_novel(&state, id, &user, Access::Modify).await?;
    let (update, delta) = plan_progress(&novel, &req);

    let novel = state
        .db
        .update_progress(novel.id, update)
        .await
        .map_err(|e| port_error(e, "Novel"))?;

    if delta != ReadingStatsDelta::default() {
        state
            .db
            .add_reading_stats(user.user_id, delta)
            .await
            .map_err(|e| port_error(e, "User"))?;
    }
    Ok(Json(NovelResponse { novel }))
}

//=========================================================================================
// Admin
//=========================================================================================

#[utoipa::path(
    get,
    path = "/api/novels/admin/all",
    responses(
        (status = 200, description = "Every novel with its owner"),
        (status = 403, description = "Not an admin", body = MessageBody)
    )
)]
pub async fn admin_list_novels_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AdminNovelsResponse>, HttpError> {
    let novels = state
        .db
        .list_all_novels()
        .await
        .map_err(|e| port_error(e, "Novels"))?;
    Ok(Json(AdminNovelsResponse { novels }))
}
