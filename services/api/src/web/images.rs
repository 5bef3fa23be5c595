//! services/api/src/web/images.rs
//!
//! Page illustrations. The prompt is built from the words actually shown on
//! the page, condensed by the summarizer and styled, then handed to the image
//! strategy chain.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use visnovel_core::domain::{AuthUser, ImageLog, ImageLogEntry, NewImageLog, ReadingStatsDelta};
use visnovel_core::images::{clean_passage, styled_prompt, ChainError, ImageRequest, ImageStyle};
use visnovel_core::pagination::strip_markup;
use visnovel_core::ResolvedPage;

use crate::adapters::summary::DEFAULT_SUMMARY_CHARS;
use crate::web::rest::{
    checked_page, http_error, load_novel, pagination_error, port_error, Access, HttpError,
    MessageBody,
};
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema, Default)]
pub struct GenerateImageRequest {
    /// One of `default`, `anime`, `realistic`, `artistic`, `fantasy`.
    pub style: Option<String>,
}

#[derive(Serialize)]
pub struct ImageResponse {
    pub image: ImageLog,
}

#[derive(Serialize)]
pub struct ImagesResponse {
    pub images: Vec<ImageLog>,
}

#[derive(Serialize)]
pub struct ImageLogsResponse {
    pub logs: Vec<ImageLogEntry>,
}

/// The plain text a reader sees on a resolved page. EPUB pages carry the
/// whole chapter, so only the page's word window is kept.
pub fn page_passage(page: &ResolvedPage) -> String {
    if !page.is_html {
        return clean_passage(&page.content);
    }
    let text = strip_markup(&page.content);
    match &page.chapter {
        Some(position) => text
            .split_whitespace()
            .skip(position.word_offset)
            .take(position.words_to_take)
            .collect::<Vec<_>>()
            .join(" "),
        None => clean_passage(&text),
    }
}

/// Generate an illustration for a page.
#[utoipa::path(
    post,
    path = "/api/images/{novel_id}/page/{page}",
    params(
        ("novel_id" = Uuid, Path, description = "Novel id"),
        ("page" = i64, Path, description = "1-based page number")
    ),
    request_body = GenerateImageRequest,
    responses(
        (status = 200, description = "The logged image"),
        (status = 400, description = "Invalid page or rejected prompt", body = MessageBody),
        (status = 403, description = "No access to the novel", body = MessageBody),
        (status = 500, description = "No image strategy succeeded", body = MessageBody)
    )
)]
pub async fn generate_image_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((novel_id, page)): Path<(Uuid, i64)>,
    body: Option<Json<GenerateImageRequest>>,
) -> Result<Json<ImageResponse>, HttpError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let style = ImageStyle::parse(req.style.as_deref().unwrap_or("default"));

    let novel = load_novel(&state, novel_id, &user, Access::Read).await?;
    let page_number = checked_page(&novel, page)?;

    // 1. Read what is actually on the page
    let resolved = state
        .paginator
        .page(FsPath::new(&novel.file_path), novel.file_type, page_number as usize)
        .await
        .map_err(pagination_error)?;
    let chapter = resolved
        .chapter
        .as_ref()
        .map(|c| c.chapter_title.clone())
        .unwrap_or_default();
    let passage = page_passage(&resolved);

    // 2. Condense it into a scene description
    let scene = match state
        .summarizer
        .summarize(&passage, &novel.title, &chapter, DEFAULT_SUMMARY_CHARS)
        .await
    {
        Ok(scene) if !scene.trim().is_empty() => scene,
        Ok(_) => format!("A scene from {}, page {}", novel.title, page_number),
        Err(e) => {
            warn!("Summarizer failed: {}", e);
            format!("A scene from {}, page {}", novel.title, page_number)
        }
    };
    let prompt = styled_prompt(&scene, &novel.title, style);

    // 3. Run the strategy chain
    let request = ImageRequest {
        prompt: prompt.clone(),
        style,
        title: novel.title.clone(),
    };
    let generated = state.image_chain.generate(&request).await.map_err(|e| match e {
        ChainError::Fatal { reason, .. } => http_error(
            StatusCode::BAD_REQUEST,
            format!("Image generation was rejected: {}", reason),
        ),
        ChainError::Exhausted { failures } => {
            error!(?failures, "Every image strategy failed");
            http_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate image")
        }
    })?;

    // 4. Store the picture and log it
    let file_name = format!(
        "{}-{}.{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        generated.image.extension
    );
    state
        .store
        .write(&state.config.images_dir().join(&file_name), &generated.image.bytes)
        .await
        .map_err(|e| port_error(e, "Image"))?;

    let failures = (!generated.earlier_failures.is_empty())
        .then(|| generated.earlier_failures.join("; "));
    let image = state
        .db
        .create_image_log(NewImageLog {
            novel_id: novel.id,
            user_id: user.user_id,
            page: page_number,
            image_url: format!("/uploads/images/{}", file_name),
            style: style.as_str().to_string(),
            prompt,
            error: failures,
            generation_method: generated.method,
        })
        .await
        .map_err(|e| port_error(e, "Image"))?;

    state
        .db
        .add_reading_stats(
            user.user_id,
            ReadingStatsDelta {
                images_generated: 1,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| port_error(e, "User"))?;

    info!(
        novel_id = %novel.id,
        page = page_number,
        strategy = generated.strategy,
        "Generated page illustration"
    );
    Ok(Json(ImageResponse { image }))
}

/// List the caller's illustrations of a page, newest first.
#[utoipa::path(
    get,
    path = "/api/images/{novel_id}/page/{page}",
    params(
        ("novel_id" = Uuid, Path, description = "Novel id"),
        ("page" = i32, Path, description = "1-based page number")
    ),
    responses((status = 200, description = "Images of the page"))
)]
pub async fn list_page_images_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((novel_id, page)): Path<(Uuid, i32)>,
) -> Result<Json<ImagesResponse>, HttpError> {
    let novel = load_novel(&state, novel_id, &user, Access::Read).await?;
    let images = state
        .db
        .list_page_images(novel.id, page, user.user_id)
        .await
        .map_err(|e| port_error(e, "Images"))?;
    Ok(Json(ImagesResponse { images }))
}

#[utoipa::path(
    get,
    path = "/api/images/logs",
    responses(
        (status = 200, description = "Every generation log with user and novel names"),
        (status = 403, description = "Not an admin", body = MessageBody)
    )
)]
pub async fn list_image_logs_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ImageLogsResponse>, HttpError> {
    let logs = state
        .db
        .list_image_logs()
        .await
        .map_err(|e| port_error(e, "Image logs"))?;
    Ok(Json(ImageLogsResponse { logs }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use visnovel_core::pagination::ChapterPosition;

    #[test]
    fn text_pages_are_used_whole() {
        let page = ResolvedPage {
            content: "The tide\n\nturned.".to_string(),
            is_html: false,
            chapter: None,
        };
        assert_eq!(page_passage(&page), "The tide turned.");
    }

    #[test]
    fn epub_pages_keep_only_their_word_window() {
        let page = ResolvedPage {
            content: "<h1>Harbor</h1>\n<p>one two three four five six</p>".to_string(),
            is_html: true,
            chapter: Some(ChapterPosition {
                chapter_index: 0,
                chapter_id: "c1".to_string(),
                chapter_title: "Harbor".to_string(),
                word_offset: 2,
                words_to_take: 3,
                total_chapters: 1,
            }),
        };
        assert_eq!(page_passage(&page), "two three four");
    }
}
