//! services/api/src/web/users.rs
//!
//! Profile, reading statistics and reading preferences of the caller, plus
//! the admin user listing.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use visnovel_core::domain::{
    AuthUser, NovelProgress, PreferencesPatch, ReadingPreferences, ReadingStats,
    ReadingStatsDelta, User, UserSummary,
};

use crate::web::rest::{http_error, message, port_error, HttpError, MessageBody};
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct ProfileRequest {
    pub name: Option<String>,
    pub bio: Option<String>,
}

#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatsRequest {
    /// Minutes to add.
    pub reading_time: Option<i64>,
    pub pages_read: Option<i64>,
    pub novel_completed: Option<bool>,
    pub images_generated: Option<i64>,
}

/// Absent fields keep their current value.
#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesRequest {
    pub theme: Option<String>,
    pub font_size: Option<u32>,
    pub font_family: Option<String>,
    pub line_spacing: Option<f32>,
    pub letter_spacing: Option<f32>,
    pub dyslexia_friendly: Option<bool>,
}

impl From<PreferencesRequest> for PreferencesPatch {
    fn from(req: PreferencesRequest) -> Self {
        Self {
            theme: req.theme,
            font_size: req.font_size,
            font_family: req.font_family,
            line_spacing: req.line_spacing,
            letter_spacing: req.letter_spacing,
            dyslexia_friendly: req.dyslexia_friendly,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    #[serde(flatten)]
    pub reading: ReadingStats,
    pub total_novels: usize,
}

#[derive(Serialize)]
pub struct ProfileView {
    #[serde(flatten)]
    pub user: User,
    pub stats: ProfileStats,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub user: ProfileView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatsResponse {
    pub stats: ReadingStats,
    pub total_novels: usize,
    pub novels_with_progress: Vec<NovelProgress>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub stats: ReadingStats,
}

#[derive(Serialize)]
pub struct PreferencesResponse {
    pub preferences: ReadingPreferences,
}

#[derive(Serialize)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
}

fn stats_delta(req: &StatsRequest) -> Result<ReadingStatsDelta, HttpError> {
    let counts = [req.reading_time, req.pages_read, req.images_generated];
    if counts.iter().flatten().any(|n| *n < 0) {
        return Err(http_error(
            StatusCode::BAD_REQUEST,
            "Statistics can only be increased",
        ));
    }
    Ok(ReadingStatsDelta {
        reading_time: req.reading_time.unwrap_or(0),
        pages_read: req.pages_read.unwrap_or(0),
        novels_completed: i64::from(req.novel_completed.unwrap_or(false)),
        images_generated: req.images_generated.unwrap_or(0),
    })
}

async fn profile(state: &AppState, user: User) -> Result<Json<ProfileResponse>, HttpError> {
    let total_novels = state
        .db
        .list_novels_by_owner(user.id)
        .await
        .map_err(|e| port_error(e, "Novels"))?
        .len();
    let stats = ProfileStats {
        reading: user.reading_stats.clone(),
        total_novels,
    };
    Ok(Json(ProfileResponse {
        user: ProfileView { user, stats },
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/profile",
    responses(
        (status = 200, description = "The caller with reading statistics"),
        (status = 404, description = "User not found", body = MessageBody)
    )
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ProfileResponse>, HttpError> {
    let user = state
        .db
        .get_user(user.user_id)
        .await
        .map_err(|e| port_error(e, "User"))?;
    profile(&state, user).await
}

#[utoipa::path(
    patch,
    path = "/api/users/profile",
    request_body = ProfileRequest,
    responses((status = 200, description = "The updated profile"))
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<ProfileResponse>, HttpError> {
    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let user = state
        .db
        .update_user_profile(user.user_id, name, req.bio.as_deref())
        .await
        .map_err(|e| port_error(e, "User"))?;
    profile(&state, user).await
}

#[utoipa::path(
    get,
    path = "/api/users/stats",
    responses((status = 200, description = "Reading statistics and per-novel progress"))
)]
pub async fn get_stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserStatsResponse>, HttpError> {
    let account = state
        .db
        .get_user(user.user_id)
        .await
        .map_err(|e| port_error(e, "User"))?;
    let novels = state
        .db
        .list_novels_by_owner(user.user_id)
        .await
        .map_err(|e| port_error(e, "Novels"))?;

    Ok(Json(UserStatsResponse {
        stats: account.reading_stats,
        total_novels: novels.len(),
        novels_with_progress: novels.iter().map(NovelProgress::from).collect(),
    }))
}

#[utoipa::path(
    patch,
    path = "/api/users/stats",
    request_body = StatsRequest,
    responses(
        (status = 200, description = "The statistics after the increments"),
        (status = 400, description = "Negative increment", body = MessageBody)
    )
)]
pub async fn update_stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<StatsRequest>,
) -> Result<Json<StatsResponse>, HttpError> {
    let delta = stats_delta(&req)?;
    let stats = state
        .db
        .add_reading_stats(user.user_id, delta)
        .await
        .map_err(|e| port_error(e, "User"))?;
    Ok(Json(StatsResponse { stats }))
}

#[utoipa::path(
    get,
    path = "/api/users/preferences",
    responses((status = 200, description = "The caller's reading preferences"))
)]
pub async fn get_preferences_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PreferencesResponse>, HttpError> {
    let account = state
        .db
        .get_user(user.user_id)
        .await
        .map_err(|e| port_error(e, "User"))?;
    Ok(Json(PreferencesResponse {
        preferences: account.reading_preferences,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/users/preferences",
    request_body = PreferencesRequest,
    responses((status = 200, description = "The merged reading preferences"))
)]
pub async fn update_preferences_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<PreferencesRequest>,
) -> Result<Json<PreferencesResponse>, HttpError> {
    let account = state
        .db
        .get_user(user.user_id)
        .await
        .map_err(|e| port_error(e, "User"))?;

    let mut preferences = account.reading_preferences;
    preferences.apply(req.into());
    let preferences = state
        .db
        .save_preferences(user.user_id, &preferences)
        .await
        .map_err(|e| port_error(e, "User"))?;
    Ok(Json(PreferencesResponse { preferences }))
}

#[utoipa::path(
    get,
    path = "/api/users/all",
    responses(
        (status = 200, description = "Every user with novel and image counts"),
        (status = 403, description = "Not an admin", body = MessageBody)
    )
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UsersResponse>, HttpError> {
    let users = state
        .db
        .list_users()
        .await
        .map_err(|e| port_error(e, "Users"))?;
    Ok(Json(UsersResponse { users }))
}

/// Deletes a user with their novels, annotations, images and shares.
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = MessageBody),
        (status = 403, description = "Not an admin", body = MessageBody),
        (status = 404, description = "User not found", body = MessageBody)
    )
)]
pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<MessageBody>, HttpError> {
    let file_paths = state
        .db
        .delete_user(user_id)
        .await
        .map_err(|e| port_error(e, "User"))?;

    for file_path in &file_paths {
        let path = FsPath::new(file_path);
        state.paginator.forget(path).await;
        if let Err(e) = state.store.remove(path).await {
            warn!(%user_id, path = %file_path, "Failed to remove novel file: {}", e);
        }
    }

    info!(%user_id, admin_id = %admin.user_id, novels = file_paths.len(), "User deleted");
    Ok(message("User deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use visnovel_core::domain::Role;

    #[test]
    fn stats_request_becomes_increments() {
        let req: StatsRequest =
            serde_json::from_str(r#"{"readingTime":15,"pagesRead":4,"novelCompleted":true}"#)
                .unwrap();
        assert_eq!(
            stats_delta(&req).unwrap(),
            ReadingStatsDelta {
                reading_time: 15,
                pages_read: 4,
                novels_completed: 1,
                images_generated: 0,
            }
        );
        assert_eq!(stats_delta(&StatsRequest::default()).unwrap(), ReadingStatsDelta::default());
    }

    #[test]
    fn negative_increments_are_rejected() {
        let req = StatsRequest {
            pages_read: Some(-2),
            ..Default::default()
        };
        let (status, _) = stats_delta(&req).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn preference_requests_only_touch_given_fields() {
        let req: PreferencesRequest =
            serde_json::from_str(r#"{"fontSize":20,"dyslexiaFriendly":true}"#).unwrap();
        let mut preferences = ReadingPreferences::default();
        preferences.apply(req.into());

        assert_eq!(preferences.font_size, 20);
        assert!(preferences.dyslexia_friendly);
        assert_eq!(preferences.theme, ReadingPreferences::default().theme);
        assert_eq!(preferences.line_spacing, ReadingPreferences::default().line_spacing);
    }

    #[test]
    fn profile_nests_stats_next_to_the_user() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::User,
            bio: String::new(),
            reading_stats: ReadingStats {
                pages_read: 12,
                ..Default::default()
            },
            reading_preferences: ReadingPreferences::default(),
            created_at: Utc::now(),
        };
        let stats = ProfileStats {
            reading: user.reading_stats.clone(),
            total_novels: 2,
        };
        let json = serde_json::to_value(ProfileResponse {
            user: ProfileView { user, stats },
        })
        .unwrap();

        assert_eq!(json["user"]["name"], "Ada");
        assert_eq!(json["user"]["readingStats"]["pagesRead"], 12);
        assert_eq!(json["user"]["stats"]["pagesRead"], 12);
        assert_eq!(json["user"]["stats"]["totalNovels"], 2);
        assert!(json["user"].get("hashedPassword").is_none());
    }
}
