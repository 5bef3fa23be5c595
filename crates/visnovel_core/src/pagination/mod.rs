//! crates/visnovel_core/src/pagination/mod.rs
//!
//! Word-count pagination of plain-text and EPUB documents.
//!
//! A page is a fixed-size window of words numbered from 1. Plain-text pages are
//! exact substrings of the source so formatting survives; EPUB pages resolve to
//! the chapter that holds the window's first word plus the offsets a client
//! needs to find the window inside that chapter.

pub mod chapters;
pub mod resolver;
pub mod text;
pub mod tokenizer;

pub use chapters::{build_index, ChapterEntry, ChapterIndex};
pub use resolver::{resolve, ChapterPosition};
pub use text::{count_pages, PageWindow, TextLayout};
pub use tokenizer::{count_words, strip_markup, word_spans, WordSpan};

use std::time::Duration;

/// Page size used when none is configured.
pub const DEFAULT_WORDS_PER_PAGE: usize = 600;

/// Page count recorded for an upload whose EPUB could not be parsed.
pub const FALLBACK_PAGE_COUNT: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    #[error("Document could not be read: {0}")]
    Io(String),
    #[error("Document could not be parsed: {0}")]
    DocumentParse(String),
    #[error("Invalid page number {page} (document has {total_pages} pages)")]
    InvalidPageNumber { page: usize, total_pages: usize },
}

pub type PaginationResult<T> = Result<T, PaginationError>;

/// What to do with a page whose window starts after the last word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PastEndPolicy {
    /// Return empty content.
    #[default]
    Empty,
    /// Fail with `PaginationError::InvalidPageNumber`.
    Reject,
}

impl PastEndPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "empty" => Some(PastEndPolicy::Empty),
            "reject" | "error" => Some(PastEndPolicy::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSettings {
    pub words_per_page: usize,
    pub past_end: PastEndPolicy,
    /// Upper bound on opening and indexing one EPUB.
    pub parse_timeout: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            words_per_page: DEFAULT_WORDS_PER_PAGE,
            past_end: PastEndPolicy::Empty,
            parse_timeout: Duration::from_secs(30),
        }
    }
}
