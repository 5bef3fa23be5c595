//! crates/visnovel_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! These structs are independent of any database; they serialize to the
//! camelCase JSON shape the web client expects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

//=========================================================================================
// Users & Auth
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Unknown role strings are treated as a regular user.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::User
        }
    }
}

/// The authenticated caller of a request, resolved from the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingStats {
    /// Minutes spent reading.
    pub total_reading_time: i64,
    pub pages_read: i64,
    pub novels_completed: i64,
    pub images_generated: i64,
}

/// Increments applied to a user's `ReadingStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadingStatsDelta {
    pub reading_time: i64,
    pub pages_read: i64,
    pub novels_completed: i64,
    pub images_generated: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadingPreferences {
    pub theme: String,
    pub font_size: u32,
    pub font_family: String,
    pub line_spacing: f32,
    pub letter_spacing: f32,
    pub dyslexia_friendly: bool,
}

impl Default for ReadingPreferences {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            font_size: 16,
            font_family: "serif".to_string(),
            line_spacing: 1.5,
            letter_spacing: 0.0,
            dyslexia_friendly: false,
        }
    }
}

/// A partial update of `ReadingPreferences`; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    pub theme: Option<String>,
    pub font_size: Option<u32>,
    pub font_family: Option<String>,
    pub line_spacing: Option<f32>,
    pub letter_spacing: Option<f32>,
    pub dyslexia_friendly: Option<bool>,
}

impl ReadingPreferences {
    pub fn apply(&mut self, patch: PreferencesPatch) {
        if let Some(theme) = patch.theme.filter(|t| !t.is_empty()) {
            self.theme = theme;
        }
        if let Some(font_size) = patch.font_size.filter(|s| *s > 0) {
            self.font_size = font_size;
        }
        if let Some(font_family) = patch.font_family.filter(|f| !f.is_empty()) {
            self.font_family = font_family;
        }
        if let Some(line_spacing) = patch.line_spacing {
            self.line_spacing = line_spacing;
        }
        if let Some(letter_spacing) = patch.letter_spacing {
            self.letter_spacing = letter_spacing;
        }
        if let Some(dyslexia_friendly) = patch.dyslexia_friendly {
            self.dyslexia_friendly = dyslexia_friendly;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub bio: String,
    pub reading_stats: ReadingStats,
    pub reading_preferences: ReadingPreferences,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub hashed_password: String,
}

/// One row of the admin user listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub novel_count: i64,
    pub image_count: i64,
    pub reading_stats: ReadingStats,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Novels
//=========================================================================================

/// The declared type of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    #[serde(rename = "txt")]
    Text,
    #[serde(rename = "epub")]
    Epub,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Text => "txt",
            DocumentKind::Epub => "epub",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "txt" => Some(DocumentKind::Text),
            "epub" => Some(DocumentKind::Epub),
            _ => None,
        }
    }

    /// Picks the kind from a file name's extension. Only `.txt` and `.epub`
    /// uploads are accepted.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())?;
        match ext.as_str() {
            "epub" => Some(DocumentKind::Epub),
            "txt" => Some(DocumentKind::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: Uuid,
    pub page: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A free-form note a reader attaches to a page of a novel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderNote {
    pub id: Uuid,
    pub page: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Novel {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub file_path: String,
    pub file_type: DocumentKind,
    pub total_pages: i32,
    pub bookmarks: Vec<Bookmark>,
    pub notes: Vec<ReaderNote>,
    pub last_read_page: i32,
    /// Minutes spent reading this novel.
    pub total_reading_time: i64,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Novel {
    /// Owners and admins may read a novel and its derived content.
    pub fn readable_by(&self, user: &AuthUser) -> bool {
        self.owner_id == user.user_id || user.is_admin()
    }

    /// Only the owner may change bookmarks, notes, annotations and progress.
    pub fn modifiable_by(&self, user: &AuthUser) -> bool {
        self.owner_id == user.user_id
    }

    pub fn is_valid_page(&self, page: i64) -> bool {
        page >= 1 && page <= i64::from(self.total_pages)
    }

    /// Rounded percentage of the novel read so far.
    pub fn progress_percent(&self) -> i64 {
        if self.total_pages <= 0 {
            return 0;
        }
        let last = f64::from(self.last_read_page.max(1));
        (last / f64::from(self.total_pages) * 100.0).round() as i64
    }
}

/// Data required to register a freshly uploaded novel.
#[derive(Debug, Clone)]
pub struct NewNovel {
    pub owner_id: Uuid,
    pub title: String,
    pub file_path: String,
    pub file_type: DocumentKind,
    pub total_pages: i32,
}

/// Changes requested through the reading-progress endpoint.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub last_read_page: Option<i32>,
    pub add_reading_time: Option<i64>,
    pub completed: Option<bool>,
}

/// A novel together with its owner's public details (admin listing).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NovelWithOwner {
    #[serde(flatten)]
    pub novel: Novel,
    pub owner_name: String,
    pub owner_email: String,
}

/// Per-novel progress row of the user statistics endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NovelProgress {
    pub id: Uuid,
    pub title: String,
    pub progress: i64,
    pub last_read_page: i32,
    pub total_pages: i32,
    pub completed: bool,
}

impl From<&Novel> for NovelProgress {
    fn from(novel: &Novel) -> Self {
        Self {
            id: novel.id,
            title: novel.title.clone(),
            progress: novel.progress_percent(),
            last_read_page: novel.last_read_page,
            total_pages: novel.total_pages,
            completed: novel.completed,
        }
    }
}

//=========================================================================================
// Annotations
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationCategory {
    #[default]
    Highlight,
    Note,
    Question,
    Important,
    Vocabulary,
    Custom,
}

impl AnnotationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationCategory::Highlight => "highlight",
            AnnotationCategory::Note => "note",
            AnnotationCategory::Question => "question",
            AnnotationCategory::Important => "important",
            AnnotationCategory::Vocabulary => "vocabulary",
            AnnotationCategory::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "highlight" => Some(AnnotationCategory::Highlight),
            "note" => Some(AnnotationCategory::Note),
            "question" => Some(AnnotationCategory::Question),
            "important" => Some(AnnotationCategory::Important),
            "vocabulary" => Some(AnnotationCategory::Vocabulary),
            "custom" => Some(AnnotationCategory::Custom),
            _ => None,
        }
    }
}

pub const DEFAULT_ANNOTATION_COLOR: &str = "#ffff00";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSelection {
    pub start_offset: i32,
    pub end_offset: i32,
    pub selected_text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub novel_id: Uuid,
    pub page: i32,
    pub text_selection: TextSelection,
    pub color: String,
    pub note: Option<String>,
    pub category: AnnotationCategory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub user_id: Uuid,
    pub novel_id: Uuid,
    pub page: i32,
    pub text_selection: TextSelection,
    pub color: String,
    pub note: Option<String>,
    pub category: AnnotationCategory,
}

/// Fields an annotation owner may change after creation.
#[derive(Debug, Clone, Default)]
pub struct AnnotationPatch {
    pub color: Option<String>,
    pub note: Option<Option<String>>,
    pub category: Option<AnnotationCategory>,
}

//=========================================================================================
// Generated images
//=========================================================================================

/// Which strategy of the image chain produced a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMethod {
    Cloudflare,
    Placeholder,
}

impl GenerationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMethod::Cloudflare => "cloudflare",
            GenerationMethod::Placeholder => "placeholder",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "cloudflare" => GenerationMethod::Cloudflare,
            _ => GenerationMethod::Placeholder,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLog {
    pub id: Uuid,
    pub novel_id: Uuid,
    pub user_id: Uuid,
    pub page: i32,
    pub image_url: String,
    pub style: String,
    pub prompt: String,
    pub error: Option<String>,
    pub generation_method: GenerationMethod,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewImageLog {
    pub novel_id: Uuid,
    pub user_id: Uuid,
    pub page: i32,
    pub image_url: String,
    pub style: String,
    pub prompt: String,
    pub error: Option<String>,
    pub generation_method: GenerationMethod,
}

/// An image log with the names the admin listing shows next to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLogEntry {
    #[serde(flatten)]
    pub log: ImageLog,
    pub user_name: String,
    pub user_email: String,
    pub novel_title: String,
}

//=========================================================================================
// Shared content
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareKind {
    Passage,
    Progress,
}

impl ShareKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareKind::Passage => "passage",
            ShareKind::Progress => "progress",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "passage" => Some(ShareKind::Passage),
            "progress" => Some(ShareKind::Progress),
            _ => None,
        }
    }
}

/// Snapshot of a reader's progress attached to a progress card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStats {
    pub current_page: i32,
    pub total_pages: i32,
    pub percent_complete: i64,
    pub total_reading_time: i64,
    pub bookmarks_count: usize,
    pub notes_count: usize,
}

impl From<&Novel> for ProgressStats {
    fn from(novel: &Novel) -> Self {
        Self {
            current_page: novel.last_read_page.max(1),
            total_pages: novel.total_pages,
            percent_complete: novel.progress_percent(),
            total_reading_time: novel.total_reading_time,
            bookmarks_count: novel.bookmarks.len(),
            notes_count: novel.notes.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedContent {
    pub id: Uuid,
    pub share_id: String,
    #[serde(rename = "type")]
    pub kind: ShareKind,
    pub user_id: Uuid,
    pub novel_id: Uuid,
    pub content: Option<String>,
    pub page: Option<i32>,
    pub image_url: Option<String>,
    pub stats: Option<ProgressStats>,
    pub share_url: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl SharedContent {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Public shares are visible to anyone; private ones only to their author.
    pub fn visible_to(&self, viewer: Option<&AuthUser>) -> bool {
        self.is_public || viewer.is_some_and(|v| v.user_id == self.user_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewSharedContent {
    pub share_id: String,
    pub kind: ShareKind,
    pub user_id: Uuid,
    pub novel_id: Uuid,
    pub content: Option<String>,
    pub page: Option<i32>,
    pub image_url: Option<String>,
    pub stats: Option<ProgressStats>,
    pub share_url: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_public: bool,
}

/// A shared item with the author name and novel title resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedContentView {
    #[serde(flatten)]
    pub content: SharedContent,
    pub user_name: String,
    pub novel_title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn novel(owner_id: Uuid, total_pages: i32, last_read_page: i32) -> Novel {
        let now = Utc::now();
        Novel {
            id: Uuid::new_v4(),
            owner_id,
            title: "Title".to_string(),
            file_path: "uploads/novels/a.txt".to_string(),
            file_type: DocumentKind::Text,
            total_pages,
            bookmarks: Vec::new(),
            notes: Vec::new(),
            last_read_page,
            total_reading_time: 0,
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_and_admin_can_read_but_only_owner_modifies() {
        let owner = AuthUser { user_id: Uuid::new_v4(), role: Role::User };
        let admin = AuthUser { user_id: Uuid::new_v4(), role: Role::Admin };
        let stranger = AuthUser { user_id: Uuid::new_v4(), role: Role::User };
        let novel = novel(owner.user_id, 3, 1);

        assert!(novel.readable_by(&owner));
        assert!(novel.readable_by(&admin));
        assert!(!novel.readable_by(&stranger));

        assert!(novel.modifiable_by(&owner));
        assert!(!novel.modifiable_by(&admin));
    }

    #[test]
    fn page_bounds_are_one_based_and_inclusive() {
        let novel = novel(Uuid::new_v4(), 3, 1);
        assert!(!novel.is_valid_page(0));
        assert!(novel.is_valid_page(1));
        assert!(novel.is_valid_page(3));
        assert!(!novel.is_valid_page(4));

        let empty = novel_with_pages(0);
        assert!(!empty.is_valid_page(1));
    }

    fn novel_with_pages(total_pages: i32) -> Novel {
        novel(Uuid::new_v4(), total_pages, 1)
    }

    #[test]
    fn progress_is_rounded_percentage() {
        assert_eq!(novel(Uuid::new_v4(), 3, 1).progress_percent(), 33);
        assert_eq!(novel(Uuid::new_v4(), 3, 2).progress_percent(), 67);
        assert_eq!(novel(Uuid::new_v4(), 0, 1).progress_percent(), 0);
    }

    #[test]
    fn document_kind_comes_from_extension() {
        assert_eq!(DocumentKind::from_file_name("Book.EPUB"), Some(DocumentKind::Epub));
        assert_eq!(DocumentKind::from_file_name("notes.txt"), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_file_name("cover.png"), None);
        assert_eq!(DocumentKind::from_file_name("README"), None);
    }

    #[test]
    fn preferences_patch_keeps_absent_fields() {
        let mut prefs = ReadingPreferences::default();
        prefs.apply(PreferencesPatch {
            theme: Some("dark".to_string()),
            dyslexia_friendly: Some(true),
            ..Default::default()
        });
        assert_eq!(prefs.theme, "dark");
        assert!(prefs.dyslexia_friendly);
        assert_eq!(prefs.font_size, 16);
    }

    #[test]
    fn shared_content_expiry_and_visibility() {
        let author = AuthUser { user_id: Uuid::new_v4(), role: Role::User };
        let other = AuthUser { user_id: Uuid::new_v4(), role: Role::User };
        let now = Utc::now();
        let share = SharedContent {
            id: Uuid::new_v4(),
            share_id: "0123456789abcdef".to_string(),
            kind: ShareKind::Passage,
            user_id: author.user_id,
            novel_id: Uuid::new_v4(),
            content: Some("A passage".to_string()),
            page: Some(2),
            image_url: None,
            stats: None,
            share_url: "http://localhost:5173/share/0123456789abcdef".to_string(),
            expires_at: Some(now - chrono::Duration::hours(1)),
            is_public: false,
            created_at: now,
        };

        assert!(share.is_expired(now));
        assert!(share.visible_to(Some(&author)));
        assert!(!share.visible_to(Some(&other)));
        assert!(!share.visible_to(None));

        let json = serde_json::to_value(&share).unwrap();
        assert_eq!(json["type"], "passage");
        assert_eq!(json["shareId"], "0123456789abcdef");
    }
}
