//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;
use visnovel_core::domain::{
    Annotation, AnnotationCategory, AnnotationPatch, AuthUser, Bookmark, DocumentKind,
    GenerationMethod, ImageLog, ImageLogEntry, NewAnnotation, NewImageLog, NewNovel,
    NewSharedContent, Novel, NovelWithOwner, ProgressStats, ProgressUpdate, ReaderNote,
    ReadingPreferences, ReadingStats, ReadingStatsDelta, Role, ShareKind, SharedContent,
    SharedContentView, TextSelection, User, UserCredentials, UserSummary,
};
use visnovel_core::ports::{DatabaseService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Loads bookmarks and notes for a batch of novel rows in two queries.
    async fn with_children(&self, records: Vec<NovelRecord>) -> PortResult<Vec<Novel>> {
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();

        let bookmarks = sqlx::query_as::<_, BookmarkRecord>(
            "SELECT id, novel_id, page, name, created_at FROM novel_bookmarks
             WHERE novel_id = ANY($1) ORDER BY created_at",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let notes = sqlx::query_as::<_, NoteRecord>(
            "SELECT id, novel_id, page, content, created_at, updated_at FROM novel_notes
             WHERE novel_id = ANY($1) ORDER BY created_at",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let mut bookmarks_by_novel: HashMap<Uuid, Vec<Bookmark>> = HashMap::new();
        for record in bookmarks {
            bookmarks_by_novel
                .entry(record.novel_id)
                .or_default()
                .push(record.to_domain());
        }
        let mut notes_by_novel: HashMap<Uuid, Vec<ReaderNote>> = HashMap::new();
        for record in notes {
            notes_by_novel
                .entry(record.novel_id)
                .or_default()
                .push(record.to_domain());
        }

        Ok(records
            .into_iter()
            .map(|record| {
                let bookmarks = bookmarks_by_novel.remove(&record.id).unwrap_or_default();
                let notes = notes_by_novel.remove(&record.id).unwrap_or_default();
                record.to_domain(bookmarks, notes)
            })
            .collect())
    }

    async fn with_children_one(&self, record: NovelRecord) -> PortResult<Novel> {
        let novel_id = record.id;
        self.with_children(vec![record])
            .await?
            .pop()
            .ok_or_else(|| PortError::NotFound(format!("Novel {} not found", novel_id)))
    }

    async fn bookmarks_of(&self, novel_id: Uuid) -> PortResult<Vec<Bookmark>> {
        let records = sqlx::query_as::<_, BookmarkRecord>(
            "SELECT id, novel_id, page, name, created_at FROM novel_bookmarks
             WHERE novel_id = $1 ORDER BY created_at",
        )
        .bind(novel_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(BookmarkRecord::to_domain).collect())
    }

    async fn notes_of(&self, novel_id: Uuid) -> PortResult<Vec<ReaderNote>> {
        let records = sqlx::query_as::<_, NoteRecord>(
            "SELECT id, novel_id, page, content, created_at, updated_at FROM novel_notes
             WHERE novel_id = $1 ORDER BY created_at",
        )
        .bind(novel_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(NoteRecord::to_domain).collect())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} not found", what)),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn conflict_or_unexpected(what: &'static str) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(what.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, name, email, role, bio, total_reading_time, pages_read, \
     novels_completed, images_generated, reading_preferences, created_at";

const NOVEL_COLUMNS: &str = "id, owner_id, title, file_path, file_type, total_pages, \
     last_read_page, total_reading_time, completed, created_at, updated_at";

const ANNOTATION_COLUMNS: &str = "id, user_id, novel_id, page, start_offset, end_offset, \
     selected_text, color, note, category, created_at, updated_at";

const IMAGE_LOG_COLUMNS: &str =
    "id, novel_id, user_id, page, image_url, style, prompt, error, generation_method, created_at";

const SHARED_COLUMNS: &str = "id, share_id, kind, user_id, novel_id, content, page, image_url, \
     stats, share_url, expires_at, is_public, created_at";

#[derive(FromRow)]
struct StatsRecord {
    total_reading_time: i64,
    pages_read: i64,
    novels_completed: i64,
    images_generated: i64,
}
impl StatsRecord {
    fn to_domain(self) -> ReadingStats {
        ReadingStats {
            total_reading_time: self.total_reading_time,
            pages_read: self.pages_read,
            novels_completed: self.novels_completed,
            images_generated: self.images_generated,
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    bio: String,
    #[sqlx(flatten)]
    stats: StatsRecord,
    reading_preferences: Json<ReadingPreferences>,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            role: Role::parse(&self.role),
            bio: self.bio,
            reading_stats: self.stats.to_domain(),
            reading_preferences: self.reading_preferences.0,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            name: self.name,
            email: self.email,
            role: Role::parse(&self.role),
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct UserSummaryRecord {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    novel_count: i64,
    image_count: i64,
    #[sqlx(flatten)]
    stats: StatsRecord,
    created_at: DateTime<Utc>,
}
impl UserSummaryRecord {
    fn to_domain(self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name,
            email: self.email,
            role: Role::parse(&self.role),
            novel_count: self.novel_count,
            image_count: self.image_count,
            reading_stats: self.stats.to_domain(),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct NovelRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    file_path: String,
    file_type: String,
    total_pages: i32,
    last_read_page: i32,
    total_reading_time: i64,
    completed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl NovelRecord {
    fn to_domain(self, bookmarks: Vec<Bookmark>, notes: Vec<ReaderNote>) -> Novel {
        Novel {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            file_path: self.file_path,
            file_type: DocumentKind::parse(&self.file_type).unwrap_or(DocumentKind::Text),
            total_pages: self.total_pages,
            bookmarks,
            notes,
            last_read_page: self.last_read_page,
            total_reading_time: self.total_reading_time,
            completed: self.completed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct NovelOwnerRecord {
    #[sqlx(flatten)]
    novel: NovelRecord,
    owner_name: String,
    owner_email: String,
}

#[derive(FromRow)]
struct BookmarkRecord {
    id: Uuid,
    novel_id: Uuid,
    page: i32,
    name: String,
    created_at: DateTime<Utc>,
}
impl BookmarkRecord {
    fn to_domain(self) -> Bookmark {
        Bookmark {
            id: self.id,
            page: self.page,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct NoteRecord {
    id: Uuid,
    novel_id: Uuid,
    page: i32,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl NoteRecord {
    fn to_domain(self) -> ReaderNote {
        ReaderNote {
            id: self.id,
            page: self.page,
            content: self.content,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct AnnotationRecord {
    id: Uuid,
    user_id: Uuid,
    novel_id: Uuid,
    page: i32,
    start_offset: i32,
    end_offset: i32,
    selected_text: String,
    color: String,
    note: Option<String>,
    category: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl AnnotationRecord {
    fn to_domain(self) -> Annotation {
        Annotation {
            id: self.id,
            user_id: self.user_id,
            novel_id: self.novel_id,
            page: self.page,
            text_selection: TextSelection {
                start_offset: self.start_offset,
                end_offset: self.end_offset,
                selected_text: self.selected_text,
            },
            color: self.color,
            note: self.note,
            category: AnnotationCategory::parse(&self.category).unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ImageLogRecord {
    id: Uuid,
    novel_id: Uuid,
    user_id: Uuid,
    page: i32,
    image_url: String,
    style: String,
    prompt: String,
    error: Option<String>,
    generation_method: String,
    created_at: DateTime<Utc>,
}
impl ImageLogRecord {
    fn to_domain(self) -> ImageLog {
        ImageLog {
            id: self.id,
            novel_id: self.novel_id,
            user_id: self.user_id,
            page: self.page,
            image_url: self.image_url,
            style: self.style,
            prompt: self.prompt,
            error: self.error,
            generation_method: GenerationMethod::parse(&self.generation_method),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ImageLogEntryRecord {
    #[sqlx(flatten)]
    log: ImageLogRecord,
    user_name: String,
    user_email: String,
    novel_title: String,
}

#[derive(FromRow)]
struct SharedRecord {
    id: Uuid,
    share_id: String,
    kind: String,
    user_id: Uuid,
    novel_id: Uuid,
    content: Option<String>,
    page: Option<i32>,
    image_url: Option<String>,
    stats: Option<Json<ProgressStats>>,
    share_url: String,
    expires_at: Option<DateTime<Utc>>,
    is_public: bool,
    created_at: DateTime<Utc>,
}
impl SharedRecord {
    fn to_domain(self) -> SharedContent {
        SharedContent {
            id: self.id,
            share_id: self.share_id,
            kind: ShareKind::parse(&self.kind).unwrap_or(ShareKind::Passage),
            user_id: self.user_id,
            novel_id: self.novel_id,
            content: self.content,
            page: self.page,
            image_url: self.image_url,
            stats: self.stats.map(|stats| stats.0),
            share_url: self.share_url,
            expires_at: self.expires_at,
            is_public: self.is_public,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SharedViewRecord {
    #[sqlx(flatten)]
    content: SharedRecord,
    user_name: String,
    novel_title: String,
}
impl SharedViewRecord {
    fn to_domain(self) -> SharedContentView {
        SharedContentView {
            content: self.content.to_domain(),
            user_name: self.user_name,
            novel_title: self.novel_title,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- Users & Auth ---

    async fn create_user(
        &self,
        name: &str,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, name, email, hashed_password) VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_or_unexpected("A user with this email already exists"))?;
        Ok(record.to_domain())
    }

    async fn get_user_credentials(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, name, email, role, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User {}", email)))?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User {}", user_id)))?;
        Ok(record.to_domain())
    }

    async fn update_user_profile(
        &self,
        user_id: Uuid,
        name: Option<&str>,
        bio: Option<&str>,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET name = COALESCE($2, name), bio = COALESCE($3, bio)
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(name)
        .bind(bio)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User {}", user_id)))?;
        Ok(record.to_domain())
    }

    async fn add_reading_stats(
        &self,
        user_id: Uuid,
        delta: ReadingStatsDelta,
    ) -> PortResult<ReadingStats> {
        let record = sqlx::query_as::<_, StatsRecord>(
            "UPDATE users SET
                total_reading_time = total_reading_time + $2,
                pages_read = pages_read + $3,
                novels_completed = novels_completed + $4,
                images_generated = images_generated + $5
             WHERE id = $1
             RETURNING total_reading_time, pages_read, novels_completed, images_generated",
        )
        .bind(user_id)
        .bind(delta.reading_time)
        .bind(delta.pages_read)
        .bind(delta.novels_completed)
        .bind(delta.images_generated)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User {}", user_id)))?;
        Ok(record.to_domain())
    }

    async fn save_preferences(
        &self,
        user_id: Uuid,
        preferences: &ReadingPreferences,
    ) -> PortResult<ReadingPreferences> {
        let (saved,): (Json<ReadingPreferences>,) = sqlx::query_as(
            "UPDATE users SET reading_preferences = $2 WHERE id = $1 RETURNING reading_preferences",
        )
        .bind(user_id)
        .bind(Json(preferences))
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User {}", user_id)))?;
        Ok(saved.0)
    }

    async fn list_users(&self) -> PortResult<Vec<UserSummary>> {
        let records = sqlx::query_as::<_, UserSummaryRecord>(
            "SELECT u.id, u.name, u.email, u.role,
                    u.total_reading_time, u.pages_read, u.novels_completed, u.images_generated,
                    u.created_at,
                    (SELECT COUNT(*) FROM novels n WHERE n.owner_id = u.id) AS novel_count,
                    (SELECT COUNT(*) FROM image_logs i WHERE i.user_id = u.id) AS image_count
             FROM users u ORDER BY u.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(UserSummaryRecord::to_domain).collect())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<Vec<String>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let paths: Vec<(String,)> =
            sqlx::query_as("SELECT file_path FROM novels WHERE owner_id = $1")
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(unexpected)?;

        // Novels, annotations, image logs, shares and sessions cascade.
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        if deleted.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(paths.into_iter().map(|(path,)| path).collect())
    }

    async fn set_user_role(&self, email: &str, role: Role) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET role = $2 WHERE email = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User {}", email)))?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthUser> {
        let row: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT s.user_id, u.role FROM auth_sessions s JOIN users u ON u.id = s.user_id
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        let (user_id, role) = row.ok_or(PortError::Unauthorized)?;
        Ok(AuthUser {
            user_id,
            role: Role::parse(&role),
        })
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Novels ---

    async fn create_novel(&self, novel: NewNovel) -> PortResult<Novel> {
        let record = sqlx::query_as::<_, NovelRecord>(&format!(
            "INSERT INTO novels (id, owner_id, title, file_path, file_type, total_pages)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {NOVEL_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(novel.owner_id)
        .bind(&novel.title)
        .bind(&novel.file_path)
        .bind(novel.file_type.as_str())
        .bind(novel.total_pages)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain(Vec::new(), Vec::new()))
    }

    async fn get_novel(&self, novel_id: Uuid) -> PortResult<Novel> {
        let record = sqlx::query_as::<_, NovelRecord>(&format!(
            "SELECT {NOVEL_COLUMNS} FROM novels WHERE id = $1"
        ))
        .bind(novel_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Novel {}", novel_id)))?;
        self.with_children_one(record).await
    }

    async fn list_novels_by_owner(&self, owner_id: Uuid) -> PortResult<Vec<Novel>> {
        let records = sqlx::query_as::<_, NovelRecord>(&format!(
            "SELECT {NOVEL_COLUMNS} FROM novels WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        self.with_children(records).await
    }

    async fn list_all_novels(&self) -> PortResult<Vec<NovelWithOwner>> {
        let records = sqlx::query_as::<_, NovelOwnerRecord>(
            "SELECT n.id, n.owner_id, n.title, n.file_path, n.file_type, n.total_pages,
                    n.last_read_page, n.total_reading_time, n.completed, n.created_at,
                    n.updated_at, u.name AS owner_name, u.email AS owner_email
             FROM novels n JOIN users u ON u.id = n.owner_id
             ORDER BY n.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let mut owners = Vec::with_capacity(records.len());
        let mut novels = Vec::with_capacity(records.len());
        for record in records {
            owners.push((record.owner_name, record.owner_email));
            novels.push(record.novel);
        }
        let novels = self.with_children(novels).await?;

        Ok(novels
            .into_iter()
            .zip(owners)
            .map(|(novel, (owner_name, owner_email))| NovelWithOwner {
                novel,
                owner_name,
                owner_email,
            })
            .collect())
    }

    async fn delete_novel(&self, novel_id: Uuid) -> PortResult<()> {
        let deleted = sqlx::query("DELETE FROM novels WHERE id = $1")
            .bind(novel_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if deleted.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Novel {} not found", novel_id)));
        }
        Ok(())
    }

    async fn set_last_read_page(&self, novel_id: Uuid, page: i32) -> PortResult<()> {
        sqlx::query("UPDATE novels SET last_read_page = $2, updated_at = NOW() WHERE id = $1")
            .bind(novel_id)
            .bind(page)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn update_progress(&self, novel_id: Uuid, update: ProgressUpdate) -> PortResult<Novel> {
        let record = sqlx::query_as::<_, NovelRecord>(&format!(
            "UPDATE novels SET
                last_read_page = COALESCE($2, last_read_page),
                total_reading_time = total_reading_time + COALESCE($3, 0),
                completed = COALESCE($4, completed),
                updated_at = NOW()
             WHERE id = $1 RETURNING {NOVEL_COLUMNS}"
        ))
        .bind(novel_id)
        .bind(update.last_read_page)
        .bind(update.add_reading_time)
        .bind(update.completed)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Novel {}", novel_id)))?;
        self.with_children_one(record).await
    }

    async fn add_bookmark(&self, novel_id: Uuid, page: i32, name: &str) -> PortResult<Vec<Bookmark>> {
        sqlx::query("INSERT INTO novel_bookmarks (id, novel_id, page, name) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(novel_id)
            .bind(page)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(conflict_or_unexpected("Bookmark already exists for this page"))?;
        self.bookmarks_of(novel_id).await
    }

    async fn remove_bookmark(&self, novel_id: Uuid, bookmark_id: Uuid) -> PortResult<Vec<Bookmark>> {
        sqlx::query("DELETE FROM novel_bookmarks WHERE id = $1 AND novel_id = $2")
            .bind(bookmark_id)
            .bind(novel_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        self.bookmarks_of(novel_id).await
    }

    async fn add_note(&self, novel_id: Uuid, page: i32, content: &str) -> PortResult<Vec<ReaderNote>> {
        sqlx::query("INSERT INTO novel_notes (id, novel_id, page, content) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(novel_id)
            .bind(page)
            .bind(content)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        self.notes_of(novel_id).await
    }

    async fn update_note(
        &self,
        novel_id: Uuid,
        note_id: Uuid,
        content: &str,
    ) -> PortResult<Vec<ReaderNote>> {
        let updated = sqlx::query(
            "UPDATE novel_notes SET content = $3, updated_at = NOW() WHERE id = $1 AND novel_id = $2",
        )
        .bind(note_id)
        .bind(novel_id)
        .bind(content)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if updated.rows_affected() == 0 {
            return Err(PortError::NotFound("Note not found".to_string()));
        }
        self.notes_of(novel_id).await
    }

    async fn delete_note(&self, novel_id: Uuid, note_id: Uuid) -> PortResult<Vec<ReaderNote>> {
        sqlx::query("DELETE FROM novel_notes WHERE id = $1 AND novel_id = $2")
            .bind(note_id)
            .bind(novel_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        self.notes_of(novel_id).await
    }

    // --- Annotations ---

    async fn list_annotations(
        &self,
        novel_id: Uuid,
        user_id: Uuid,
        page: Option<i32>,
    ) -> PortResult<Vec<Annotation>> {
        let records = sqlx::query_as::<_, AnnotationRecord>(&format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotations
             WHERE novel_id = $1 AND user_id = $2 AND ($3::INTEGER IS NULL OR page = $3)
             ORDER BY page, start_offset"
        ))
        .bind(novel_id)
        .bind(user_id)
        .bind(page)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(AnnotationRecord::to_domain).collect())
    }

    async fn create_annotation(&self, annotation: NewAnnotation) -> PortResult<Annotation> {
        let record = sqlx::query_as::<_, AnnotationRecord>(&format!(
            "INSERT INTO annotations
                (id, user_id, novel_id, page, start_offset, end_offset, selected_text, color, note, category)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {ANNOTATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(annotation.user_id)
        .bind(annotation.novel_id)
        .bind(annotation.page)
        .bind(annotation.text_selection.start_offset)
        .bind(annotation.text_selection.end_offset)
        .bind(&annotation.text_selection.selected_text)
        .bind(&annotation.color)
        .bind(&annotation.note)
        .bind(annotation.category.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_annotation(&self, annotation_id: Uuid) -> PortResult<Annotation> {
        let record = sqlx::query_as::<_, AnnotationRecord>(&format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE id = $1"
        ))
        .bind(annotation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected("Annotation".to_string()))?;
        Ok(record.to_domain())
    }

    async fn update_annotation(
        &self,
        annotation_id: Uuid,
        patch: AnnotationPatch,
    ) -> PortResult<Annotation> {
        let (replace_note, note) = match patch.note {
            Some(note) => (true, note),
            None => (false, None),
        };
        let record = sqlx::query_as::<_, AnnotationRecord>(&format!(
            "UPDATE annotations SET
                color = COALESCE($2, color),
                note = CASE WHEN $3 THEN $4 ELSE note END,
                category = COALESCE($5, category),
                updated_at = NOW()
             WHERE id = $1 RETURNING {ANNOTATION_COLUMNS}"
        ))
        .bind(annotation_id)
        .bind(patch.color)
        .bind(replace_note)
        .bind(note)
        .bind(patch.category.map(|c| c.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected("Annotation".to_string()))?;
        Ok(record.to_domain())
    }

    async fn delete_annotation(&self, annotation_id: Uuid) -> PortResult<()> {
        let deleted = sqlx::query("DELETE FROM annotations WHERE id = $1")
            .bind(annotation_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if deleted.rows_affected() == 0 {
            return Err(PortError::NotFound("Annotation not found".to_string()));
        }
        Ok(())
    }

    // --- Generated images ---

    async fn create_image_log(&self, log: NewImageLog) -> PortResult<ImageLog> {
        let record = sqlx::query_as::<_, ImageLogRecord>(&format!(
            "INSERT INTO image_logs
                (id, novel_id, user_id, page, image_url, style, prompt, error, generation_method)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {IMAGE_LOG_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(log.novel_id)
        .bind(log.user_id)
        .bind(log.page)
        .bind(&log.image_url)
        .bind(&log.style)
        .bind(&log.prompt)
        .bind(&log.error)
        .bind(log.generation_method.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_page_images(
        &self,
        novel_id: Uuid,
        page: i32,
        user_id: Uuid,
    ) -> PortResult<Vec<ImageLog>> {
        let records = sqlx::query_as::<_, ImageLogRecord>(&format!(
            "SELECT {IMAGE_LOG_COLUMNS} FROM image_logs
             WHERE novel_id = $1 AND page = $2 AND user_id = $3
             ORDER BY created_at DESC"
        ))
        .bind(novel_id)
        .bind(page)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(ImageLogRecord::to_domain).collect())
    }

    async fn get_image_log(&self, image_id: Uuid) -> PortResult<ImageLog> {
        let record = sqlx::query_as::<_, ImageLogRecord>(&format!(
            "SELECT {IMAGE_LOG_COLUMNS} FROM image_logs WHERE id = $1"
        ))
        .bind(image_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Image {}", image_id)))?;
        Ok(record.to_domain())
    }

    async fn list_image_logs(&self) -> PortResult<Vec<ImageLogEntry>> {
        let records = sqlx::query_as::<_, ImageLogEntryRecord>(
            "SELECT i.id, i.novel_id, i.user_id, i.page, i.image_url, i.style, i.prompt,
                    i.error, i.generation_method, i.created_at,
                    u.name AS user_name, u.email AS user_email, n.title AS novel_title
             FROM image_logs i
             JOIN users u ON u.id = i.user_id
             JOIN novels n ON n.id = i.novel_id
             ORDER BY i.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|record| ImageLogEntry {
                log: record.log.to_domain(),
                user_name: record.user_name,
                user_email: record.user_email,
                novel_title: record.novel_title,
            })
            .collect())
    }

    // --- Shared content ---

    async fn create_shared_content(&self, content: NewSharedContent) -> PortResult<SharedContent> {
        let record = sqlx::query_as::<_, SharedRecord>(&format!(
            "INSERT INTO shared_contents
                (id, share_id, kind, user_id, novel_id, content, page, image_url, stats,
                 share_url, expires_at, is_public)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {SHARED_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&content.share_id)
        .bind(content.kind.as_str())
        .bind(content.user_id)
        .bind(content.novel_id)
        .bind(&content.content)
        .bind(content.page)
        .bind(&content.image_url)
        .bind(content.stats.as_ref().map(Json))
        .bind(&content.share_url)
        .bind(content.expires_at)
        .bind(content.is_public)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_or_unexpected("Share id already taken"))?;
        Ok(record.to_domain())
    }

    async fn get_shared_content(&self, share_id: &str) -> PortResult<SharedContentView> {
        let record = sqlx::query_as::<_, SharedViewRecord>(
            "SELECT s.id, s.share_id, s.kind, s.user_id, s.novel_id, s.content, s.page,
                    s.image_url, s.stats, s.share_url, s.expires_at, s.is_public, s.created_at,
                    u.name AS user_name, n.title AS novel_title
             FROM shared_contents s
             JOIN users u ON u.id = s.user_id
             JOIN novels n ON n.id = s.novel_id
             WHERE s.share_id = $1",
        )
        .bind(share_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected("Shared content".to_string()))?;
        Ok(record.to_domain())
    }

    async fn list_shared_by_user(&self, user_id: Uuid) -> PortResult<Vec<SharedContentView>> {
        let records = sqlx::query_as::<_, SharedViewRecord>(
            "SELECT s.id, s.share_id, s.kind, s.user_id, s.novel_id, s.content, s.page,
                    s.image_url, s.stats, s.share_url, s.expires_at, s.is_public, s.created_at,
                    u.name AS user_name, n.title AS novel_title
             FROM shared_contents s
             JOIN users u ON u.id = s.user_id
             JOIN novels n ON n.id = s.novel_id
             WHERE s.user_id = $1
             ORDER BY s.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(SharedViewRecord::to_domain).collect())
    }

    async fn delete_shared_content(&self, share_id: &str) -> PortResult<()> {
        let deleted = sqlx::query("DELETE FROM shared_contents WHERE share_id = $1")
            .bind(share_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if deleted.rows_affected() == 0 {
            return Err(PortError::NotFound("Shared content not found".to_string()));
        }
        Ok(())
    }
}
