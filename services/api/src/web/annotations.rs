//! services/api/src/web/annotations.rs
//!
//! Highlights and marginal notes anchored to a text selection on a page.
//! Readers only ever see their own annotations.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use visnovel_core::domain::{
    Annotation, AnnotationCategory, AnnotationPatch, AuthUser, NewAnnotation, TextSelection,
    DEFAULT_ANNOTATION_COLOR,
};

use crate::web::rest::{
    checked_page, http_error, load_novel, message, port_error, Access, HttpError, MessageBody,
};
use crate::web::state::AppState;

#[derive(Serialize)]
pub struct AnnotationResponse {
    pub annotation: Annotation,
}

#[derive(Serialize)]
pub struct AnnotationsResponse {
    pub annotations: Vec<Annotation>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    pub start_offset: Option<i32>,
    pub end_offset: Option<i32>,
    pub selected_text: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnotationRequest {
    pub page: Option<i64>,
    pub text_selection: Option<SelectionRequest>,
    pub color: Option<String>,
    pub note: Option<String>,
    pub category: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateAnnotationRequest {
    pub color: Option<String>,
    /// `null` clears the note; leaving it out keeps it.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub note: Option<Option<String>>,
    pub category: Option<String>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn parse_category(category: Option<&str>) -> Result<Option<AnnotationCategory>, HttpError> {
    match category.map(str::trim).filter(|c| !c.is_empty()) {
        None => Ok(None),
        Some(value) => AnnotationCategory::parse(value)
            .map(Some)
            .ok_or_else(|| http_error(StatusCode::BAD_REQUEST, "Invalid annotation category")),
    }
}

fn required_selection(selection: Option<SelectionRequest>) -> Result<TextSelection, HttpError> {
    let missing = || http_error(StatusCode::BAD_REQUEST, "Missing required fields");
    let selection = selection.ok_or_else(missing)?;
    let start_offset = selection.start_offset.ok_or_else(missing)?;
    let end_offset = selection.end_offset.ok_or_else(missing)?;
    let selected_text = selection
        .selected_text
        .filter(|text| !text.is_empty())
        .ok_or_else(missing)?;
    if start_offset < 0 || end_offset < start_offset {
        return Err(http_error(StatusCode::BAD_REQUEST, "Invalid text selection"));
    }
    Ok(TextSelection {
        start_offset,
        end_offset,
        selected_text,
    })
}

/// Loads an annotation the caller created.
async fn own_annotation(
    state: &AppState,
    annotation_id: Uuid,
    user: &AuthUser,
) -> Result<Annotation, HttpError> {
    let annotation = state
        .db
        .get_annotation(annotation_id)
        .await
        .map_err(|e| port_error(e, "Annotation"))?;
    if annotation.user_id != user.user_id {
        return Err(http_error(
            StatusCode::FORBIDDEN,
            "Not authorized to change this annotation",
        ));
    }
    Ok(annotation)
}

#[utoipa::path(
    get,
    path = "/api/annotations/novels/{novel_id}",
    params(("novel_id" = Uuid, Path, description = "Novel id")),
    responses(
        (status = 200, description = "The caller's annotations ordered by page and offset"),
        (status = 403, description = "No access to the novel", body = MessageBody)
    )
)]
pub async fn list_annotations_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(novel_id): Path<Uuid>,
) -> Result<Json<AnnotationsResponse>, HttpError> {
    let novel = load_novel(&state, novel_id, &user, Access::Read).await?;
    let annotations = state
        .db
        .list_annotations(novel.id, user.user_id, None)
        .await
        .map_err(|e| port_error(e, "Annotations"))?;
    Ok(Json(AnnotationsResponse { annotations }))
}

#[utoipa::path(
    get,
    path = "/api/annotations/novels/{novel_id}/pages/{page}",
    params(
        ("novel_id" = Uuid, Path, description = "Novel id"),
        ("page" = i32, Path, description = "1-based page number")
    ),
    responses((status = 200, description = "The caller's annotations on the page"))
)]
pub async fn list_page_annotations_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((novel_id, page)): Path<(Uuid, i32)>,
) -> Result<Json<AnnotationsResponse>, HttpError> {
    let novel = load_novel(&state, novel_id, &user, Access::Read).await?;
    let annotations = state
        .db
        .list_annotations(novel.id, user.user_id, Some(page))
        .await
        .map_err(|e| port_error(e, "Annotations"))?;
    Ok(Json(AnnotationsResponse { annotations }))
}

#[utoipa::path(
    post,
    path = "/api/annotations/novels/{novel_id}",
    params(("novel_id" = Uuid, Path, description = "Novel id")),
    request_body = CreateAnnotationRequest,
    responses(
        (status = 201, description = "Annotation created"),
        (status = 400, description = "Missing or invalid fields", body = MessageBody),
        (status = 403, description = "Not the owner of the novel", body = MessageBody)
    )
)]
pub async fn create_annotation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(novel_id): Path<Uuid>,
    Json(req): Json<CreateAnnotationRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let page = req
        .page
        .ok_or_else(|| http_error(StatusCode::BAD_REQUEST, "Missing required fields"))?;
    let text_selection = required_selection(req.text_selection)?;
    let category = parse_category(req.category.as_deref())?.unwrap_or_default();

    let novel = load_novel(&state, novel_id, &user, Access::Modify).await?;
    let page = checked_page(&novel, page)?;

    let annotation = state
        .db
        .create_annotation(NewAnnotation {
            user_id: user.user_id,
            novel_id: novel.id,
            page,
            text_selection,
            color: req
                .color
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ANNOTATION_COLOR.to_string()),
            note: req.note,
            category,
        })
        .await
        .map_err(|e| port_error(e, "Annotation"))?;
    Ok((StatusCode::CREATED, Json(AnnotationResponse { annotation })))
}

#[utoipa::path(
    patch,
    path = "/api/annotations/{id}",
    params(("id" = Uuid, Path, description = "Annotation id")),
    request_body = UpdateAnnotationRequest,
    responses(
        (status = 200, description = "Annotation updated"),
        (status = 403, description = "Not the annotation's author", body = MessageBody),
        (status = 404, description = "Annotation not found", body = MessageBody)
    )
)]
pub async fn update_annotation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAnnotationRequest>,
) -> Result<Json<AnnotationResponse>, HttpError> {
    let category = parse_category(req.category.as_deref())?;
    let annotation = own_annotation(&state, id, &user).await?;

    let patch = AnnotationPatch {
        color: req.color.filter(|c| !c.trim().is_empty()),
        note: req.note,
        category,
    };
    let annotation = state
        .db
        .update_annotation(annotation.id, patch)
        .await
        .map_err(|e| port_error(e, "Annotation"))?;
    Ok(Json(AnnotationResponse { annotation }))
}

#[utoipa::path(
    delete,
    path = "/api/annotations/{id}",
    params(("id" = Uuid, Path, description = "Annotation id")),
    responses(
        (status = 200, description = "Annotation deleted", body = MessageBody),
        (status = 403, description = "Not the annotation's author", body = MessageBody),
        (status = 404, description = "Annotation not found", body = MessageBody)
    )
)]
pub async fn delete_annotation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageBody>, HttpError> {
    let annotation = own_annotation(&state, id, &user).await?;
    state
        .db
        .delete_annotation(annotation.id)
        .await
        .map_err(|e| port_error(e, "Annotation"))?;
    Ok(message("Annotation deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selections_need_every_field() {
        let selection: SelectionRequest =
            serde_json::from_str(r#"{"startOffset":0,"endOffset":5,"selectedText":"Waves"}"#).unwrap();
        let selection = required_selection(Some(selection)).unwrap();
        assert_eq!(selection.start_offset, 0);
        assert_eq!(selection.selected_text, "Waves");

        let partial: SelectionRequest = serde_json::from_str(r#"{"startOffset":3}"#).unwrap();
        let (status, body) = required_selection(Some(partial)).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.message, "Missing required fields");
        assert!(required_selection(None).is_err());
    }

    #[test]
    fn reversed_selections_are_rejected() {
        let reversed = SelectionRequest {
            start_offset: Some(9),
            end_offset: Some(2),
            selected_text: Some("x".to_string()),
        };
        assert_eq!(required_selection(Some(reversed)).unwrap_err().1.message, "Invalid text selection");
    }

    #[test]
    fn note_patch_distinguishes_null_from_absent() {
        let cleared: UpdateAnnotationRequest = serde_json::from_str(r#"{"note":null}"#).unwrap();
        assert_eq!(cleared.note, Some(None));
        let kept: UpdateAnnotationRequest = serde_json::from_str(r##"{"color":"#00ff00"}"##).unwrap();
        assert_eq!(kept.note, None);
        let set: UpdateAnnotationRequest = serde_json::from_str(r#"{"note":"later"}"#).unwrap();
        assert_eq!(set.note, Some(Some("later".to_string())));
    }

    #[test]
    fn categories_are_validated() {
        assert_eq!(parse_category(None).unwrap(), None);
        assert_eq!(parse_category(Some("question")).unwrap(), Some(AnnotationCategory::Question));
        assert!(parse_category(Some("doodle")).is_err());
    }
}
