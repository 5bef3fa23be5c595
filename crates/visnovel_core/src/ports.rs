//! crates/visnovel_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases, the
//! filesystem, EPUB parsers or AI providers.

use crate::domain::{
    Annotation, AnnotationPatch, AuthUser, Bookmark, ImageLog, ImageLogEntry, NewAnnotation,
    NewImageLog, NewNovel, NewSharedContent, Novel, NovelWithOwner, ProgressUpdate,
    ReaderNote, ReadingPreferences, ReadingStats, ReadingStatsDelta, Role, SharedContent,
    SharedContentView, User, UserCredentials, UserSummary,
};
use crate::images::{GeneratedImage, ImageRequest};
use crate::domain::GenerationMethod;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Port
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users & Auth ---
    async fn create_user(&self, name: &str, email: &str, hashed_password: &str)
        -> PortResult<User>;

    async fn get_user_credentials(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn update_user_profile(
        &self,
        user_id: Uuid,
        name: Option<&str>,
        bio: Option<&str>,
    ) -> PortResult<User>;

    async fn add_reading_stats(
        &self,
        user_id: Uuid,
        delta: ReadingStatsDelta,
    ) -> PortResult<ReadingStats>;

    async fn save_preferences(
        &self,
        user_id: Uuid,
        preferences: &ReadingPreferences,
    ) -> PortResult<ReadingPreferences>;

    async fn list_users(&self) -> PortResult<Vec<UserSummary>>;

    /// Deletes a user with everything they own and returns the file paths of
    /// their novels so the caller can remove the files.
    async fn delete_user(&self, user_id: Uuid) -> PortResult<Vec<String>>;

    async fn set_user_role(&self, email: &str, role: Role) -> PortResult<User>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthUser>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Novels ---
    async fn create_novel(&self, novel: NewNovel) -> PortResult<Novel>;

    async fn get_novel(&self, novel_id: Uuid) -> PortResult<Novel>;

    async fn list_novels_by_owner(&self, owner_id: Uuid) -> PortResult<Vec<Novel>>;

    async fn list_all_novels(&self) -> PortResult<Vec<NovelWithOwner>>;

    async fn delete_novel(&self, novel_id: Uuid) -> PortResult<()>;

    async fn set_last_read_page(&self, novel_id: Uuid, page: i32) -> PortResult<()>;

    async fn update_progress(&self, novel_id: Uuid, update: ProgressUpdate) -> PortResult<Novel>;

    async fn add_bookmark(&self, novel_id: Uuid, page: i32, name: &str)
        -> PortResult<Vec<Bookmark>>;

    async fn remove_bookmark(&self, novel_id: Uuid, bookmark_id: Uuid)
        -> PortResult<Vec<Bookmark>>;

    async fn add_note(&self, novel_id: Uuid, page: i32, content: &str)
        -> PortResult<Vec<ReaderNote>>;

    async fn update_note(&self, novel_id: Uuid, note_id: Uuid, content: &str)
        -> PortResult<Vec<ReaderNote>>;

    async fn delete_note(&self, novel_id: Uuid, note_id: Uuid) -> PortResult<Vec<ReaderNote>>;

    // --- Annotations ---
    async fn list_annotations(
        &self,
        novel_id: Uuid,
        user_id: Uuid,
        page: Option<i32>,
    ) -> PortResult<Vec<Annotation>>;

    async fn create_annotation(&self, annotation: NewAnnotation) -> PortResult<Annotation>;

    async fn get_annotation(&self, annotation_id: Uuid) -> PortResult<Annotation>;

    async fn update_annotation(
        &self,
        annotation_id: Uuid,
        patch: AnnotationPatch,
    ) -> PortResult<Annotation>;

    async fn delete_annotation(&self, annotation_id: Uuid) -> PortResult<()>;

    // --- Generated images ---
    async fn create_image_log(&self, log: NewImageLog) -> PortResult<ImageLog>;

    async fn list_page_images(
        &self,
        novel_id: Uuid,
        page: i32,
        user_id: Uuid,
    ) -> PortResult<Vec<ImageLog>>;

    async fn get_image_log(&self, image_id: Uuid) -> PortResult<ImageLog>;

    async fn list_image_logs(&self) -> PortResult<Vec<ImageLogEntry>>;

    // --- Shared content ---
    async fn create_shared_content(&self, content: NewSharedContent)
        -> PortResult<SharedContent>;

    async fn get_shared_content(&self, share_id: &str) -> PortResult<SharedContentView>;

    async fn list_shared_by_user(&self, user_id: Uuid) -> PortResult<Vec<SharedContentView>>;

    async fn delete_shared_content(&self, share_id: &str) -> PortResult<()>;
}

//=========================================================================================
// Document Storage Ports
//=========================================================================================

/// Identity of a stored file at a point in time. A rewritten file gets a new
/// stamp, which is what keeps derived caches from serving stale data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileStamp {
    pub path: PathBuf,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn stamp(&self, path: &Path) -> PortResult<FileStamp>;

    async fn read_text(&self, path: &Path) -> PortResult<String>;

    async fn write(&self, path: &Path, bytes: &[u8]) -> PortResult<()>;

    async fn remove(&self, path: &Path) -> PortResult<()>;
}

/// One chapter in an EPUB's declared reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEntry {
    /// Zero-based position in the reading order.
    pub position: usize,
    pub id: String,
    pub title: Option<String>,
}

/// Opens EPUB containers.
#[async_trait]
pub trait BookSource: Send + Sync {
    async fn open(&self, path: &Path) -> PortResult<Arc<dyn OpenedBook>>;
}

/// A parsed EPUB container whose chapters can be fetched independently.
#[async_trait]
pub trait OpenedBook: Send + Sync {
    fn flow(&self) -> &[FlowEntry];

    /// Returns the raw (X)HTML of a chapter.
    async fn chapter_markup(&self, entry: &FlowEntry) -> PortResult<String>;
}

//=========================================================================================
// AI Ports
//=========================================================================================

#[async_trait]
pub trait SummaryService: Send + Sync {
    /// Condenses a passage into a short visual description.
    async fn summarize(
        &self,
        text: &str,
        title: &str,
        chapter: &str,
        max_len: usize,
    ) -> PortResult<String>;
}

/// The tagged result of one image-generation attempt.
#[derive(Debug)]
pub enum StrategyOutcome {
    Generated(GeneratedImage),
    /// This strategy failed; the next one may still succeed.
    Retryable(String),
    /// The request cannot succeed with any strategy.
    Fatal(String),
}

#[async_trait]
pub trait ImageStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn method(&self) -> GenerationMethod;

    async fn generate(&self, request: &ImageRequest) -> StrategyOutcome;
}
