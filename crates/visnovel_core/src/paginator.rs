//! crates/visnovel_core/src/paginator.rs
//!
//! The document paginator: counts pages and resolves page content for
//! uploaded plain-text and EPUB files, memoizing the expensive per-file work.

use crate::cache::BoundedCache;
use crate::domain::DocumentKind;
use crate::pagination::{
    build_index, resolve, ChapterIndex, ChapterPosition, PaginationError, PaginationResult,
    PaginationSettings, PastEndPolicy, TextLayout, FALLBACK_PAGE_COUNT,
};
use crate::ports::{BookSource, DocumentStore, FileStamp, OpenedBook, PortError};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Opened EPUBs and their chapter indices keyed by file identity. A rewritten
/// file gets a new stamp and therefore a fresh parse.
pub type ChapterIndexCache = BoundedCache<FileStamp, IndexedBook>;
/// Text page layouts keyed by file identity and page size.
pub type TextLayoutCache = BoundedCache<(FileStamp, usize), Arc<TextLayout>>;

/// An opened EPUB kept together with the index built from it, so page reads
/// fetch chapter markup without reparsing the container.
#[derive(Clone)]
pub struct IndexedBook {
    pub book: Arc<dyn OpenedBook>,
    pub index: Arc<ChapterIndex>,
}

/// One EPUB page: the full markup of the chapter holding the page's first
/// word, and where inside that chapter the page lies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubPage {
    pub content: String,
    pub is_html: bool,
    pub position: Option<ChapterPosition>,
}

/// A resolved page as handed to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPage {
    pub content: String,
    pub is_html: bool,
    #[serde(flatten)]
    pub chapter: Option<ChapterPosition>,
}

pub struct Paginator {
    store: Arc<dyn DocumentStore>,
    books: Arc<dyn BookSource>,
    settings: PaginationSettings,
    chapter_indices: Mutex<ChapterIndexCache>,
    text_layouts: Mutex<TextLayoutCache>,
}

impl Paginator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        books: Arc<dyn BookSource>,
        settings: PaginationSettings,
        chapter_indices: ChapterIndexCache,
        text_layouts: TextLayoutCache,
    ) -> Self {
        Self {
            store,
            books,
            settings,
            chapter_indices: Mutex::new(chapter_indices),
            text_layouts: Mutex::new(text_layouts),
        }
    }

    pub fn settings(&self) -> &PaginationSettings {
        &self.settings
    }

    pub async fn count_pages(&self, path: &Path, kind: DocumentKind) -> PaginationResult<usize> {
        match kind {
            DocumentKind::Text => self.count_text_pages(path).await,
            DocumentKind::Epub => self.count_epub_pages(path).await,
        }
    }

    /// Page count recorded when a document is uploaded. An EPUB that cannot
    /// be parsed is still accepted with a single page; unreadable files fail.
    pub async fn upload_page_count(
        &self,
        path: &Path,
        kind: DocumentKind,
    ) -> PaginationResult<usize> {
        match self.count_pages(path, kind).await {
            Err(PaginationError::DocumentParse(reason)) => {
                warn!(path = %path.display(), %reason, "Could not paginate upload, using fallback page count");
                Ok(FALLBACK_PAGE_COUNT)
            }
            other => other,
        }
    }

    pub async fn page(
        &self,
        path: &Path,
        kind: DocumentKind,
        page: usize,
    ) -> PaginationResult<ResolvedPage> {
        match kind {
            DocumentKind::Text => Ok(ResolvedPage {
                content: self.text_page(path, page).await?,
                is_html: false,
                chapter: None,
            }),
            DocumentKind::Epub => {
                let EpubPage {
                    content,
                    is_html,
                    position,
                } = self.epub_page(path, page).await?;
                Ok(ResolvedPage {
                    content,
                    is_html,
                    chapter: position,
                })
            }
        }
    }

    //--------------------------------------------------------------------------
    // Plain text
    //--------------------------------------------------------------------------

    pub async fn count_text_pages(&self, path: &Path) -> PaginationResult<usize> {
        let (_, layout) = self.text_layout(path).await?;
        Ok(layout.total_pages())
    }

    /// The exact substring of the file covering `page`, whitespace included.
    pub async fn text_page(&self, path: &Path, page: usize) -> PaginationResult<String> {
        let (text, layout) = self.text_layout(path).await?;
        if page == 0 {
            return Err(invalid_page(page, layout.total_pages()));
        }
        match layout.slice(&text, page) {
            Some(content) => Ok(content.to_string()),
            None => self.past_end(page, layout.total_pages()).map(|()| String::new()),
        }
    }

    async fn text_layout(&self, path: &Path) -> PaginationResult<(String, Arc<TextLayout>)> {
        let stamp = self.store.stamp(path).await.map_err(io_error)?;
        let text = self.store.read_text(path).await.map_err(io_error)?;
        let key = (stamp, self.settings.words_per_page);

        if let Some(layout) = self.text_layouts.lock().await.get(&key) {
            if layout.fits(&text) {
                return Ok((text, layout));
            }
        }

        let layout = Arc::new(TextLayout::scan(&text, self.settings.words_per_page));
        debug!(
            path = %path.display(),
            words = layout.total_words(),
            pages = layout.total_pages(),
            "Scanned text layout"
        );
        self.text_layouts.lock().await.insert(key, layout.clone());
        Ok((text, layout))
    }

    //--------------------------------------------------------------------------
    // EPUB
    //--------------------------------------------------------------------------

    pub async fn count_epub_pages(&self, path: &Path) -> PaginationResult<usize> {
        let indexed = self.indexed_book(path).await?;
        Ok(indexed.index.total_pages(self.settings.words_per_page))
    }

    pub async fn epub_page(&self, path: &Path, page: usize) -> PaginationResult<EpubPage> {
        let IndexedBook { book, index } = self.indexed_book(path).await?;
        let total_pages = index.total_pages(self.settings.words_per_page);
        if page == 0 {
            return Err(invalid_page(page, total_pages));
        }

        let Some(position) = resolve(&index, page, self.settings.words_per_page) else {
            self.past_end(page, total_pages)?;
            return Ok(EpubPage {
                content: String::new(),
                is_html: true,
                position: None,
            });
        };

        let entry = book
            .flow()
            .iter()
            .find(|entry| entry.id == position.chapter_id)
            .cloned()
            .ok_or_else(|| {
                PaginationError::DocumentParse(format!(
                    "chapter {} is no longer in the reading order",
                    position.chapter_id
                ))
            })?;
        let content = self.with_timeout(book.chapter_markup(&entry)).await?;

        Ok(EpubPage {
            content,
            is_html: true,
            position: Some(position),
        })
    }

    async fn indexed_book(&self, path: &Path) -> PaginationResult<IndexedBook> {
        let stamp = self.store.stamp(path).await.map_err(io_error)?;
        if let Some(indexed) = self.chapter_indices.lock().await.get(&stamp) {
            return Ok(indexed);
        }

        let book = self.open_book(path).await?;
        let indexing = tokio::time::timeout(self.settings.parse_timeout, build_index(book.as_ref()));
        let index = match indexing.await {
            Ok(index) => Arc::new(index?),
            Err(_) => return Err(self.timed_out()),
        };
        info!(
            path = %path.display(),
            chapters = index.len(),
            words = index.total_words(),
            "Indexed EPUB chapters"
        );
        let indexed = IndexedBook { book, index };
        self.chapter_indices.lock().await.insert(stamp, indexed.clone());
        Ok(indexed)
    }

    async fn open_book(&self, path: &Path) -> PaginationResult<Arc<dyn OpenedBook>> {
        self.with_timeout(self.books.open(path)).await
    }

    async fn with_timeout<T>(
        &self,
        work: impl std::future::Future<Output = Result<T, PortError>>,
    ) -> PaginationResult<T> {
        match tokio::time::timeout(self.settings.parse_timeout, work).await {
            Ok(result) => result.map_err(|e| PaginationError::DocumentParse(e.to_string())),
            Err(_) => Err(self.timed_out()),
        }
    }

    fn timed_out(&self) -> PaginationError {
        PaginationError::DocumentParse(format!(
            "EPUB parsing timed out after {}s",
            self.settings.parse_timeout.as_secs_f32()
        ))
    }

    //--------------------------------------------------------------------------
    // Cache maintenance
    //--------------------------------------------------------------------------

    /// Drops every cached entry for `path`, whatever its stamp.
    pub async fn forget(&self, path: &Path) {
        self.chapter_indices
            .lock()
            .await
            .retain(|stamp| stamp.path != path);
        self.text_layouts
            .lock()
            .await
            .retain(|(stamp, _)| stamp.path != path);
    }

    fn past_end(&self, page: usize, total_pages: usize) -> PaginationResult<()> {
        match self.settings.past_end {
            PastEndPolicy::Empty => Ok(()),
            PastEndPolicy::Reject => Err(invalid_page(page, total_pages)),
        }
    }
}

fn invalid_page(page: usize, total_pages: usize) -> PaginationError {
    PaginationError::InvalidPageNumber { page, total_pages }
}

fn io_error(err: PortError) -> PaginationError {
    PaginationError::Io(err.to_string())
}
