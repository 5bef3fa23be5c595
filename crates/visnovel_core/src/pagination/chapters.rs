//! Cumulative word-count index over an EPUB's chapters.

use super::text::count_pages;
use super::tokenizer::{count_words, strip_markup};
use super::{PaginationError, PaginationResult};
use crate::ports::{FlowEntry, OpenedBook, PortError};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterEntry {
    pub position: usize,
    pub id: String,
    pub title: Option<String>,
    pub word_count: usize,
    /// Words in all chapters that come before this one.
    pub words_before: usize,
}

impl ChapterEntry {
    pub fn contains(&self, word: usize) -> bool {
        word >= self.words_before && word < self.words_before + self.word_count
    }
}

/// Chapters in reading order with their cumulative word counts.
///
/// `words_before` never decreases from one chapter to the next and the word
/// counts add up to `total_words`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterIndex {
    chapters: Vec<ChapterEntry>,
    total_words: usize,
}

impl ChapterIndex {
    /// Builds the index from per-chapter word counts, ordered by reading
    /// position whatever order they arrive in.
    pub fn from_counts(counts: impl IntoIterator<Item = (FlowEntry, usize)>) -> Self {
        let mut counts: Vec<(FlowEntry, usize)> = counts.into_iter().collect();
        counts.sort_by_key(|(entry, _)| entry.position);

        let mut total_words = 0usize;
        let chapters = counts
            .into_iter()
            .map(|(entry, word_count)| {
                let chapter = ChapterEntry {
                    position: entry.position,
                    id: entry.id,
                    title: entry.title,
                    word_count,
                    words_before: total_words,
                };
                total_words += word_count;
                chapter
            })
            .collect();

        Self {
            chapters,
            total_words,
        }
    }

    pub fn chapters(&self) -> &[ChapterEntry] {
        &self.chapters
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn total_words(&self) -> usize {
        self.total_words
    }

    pub fn total_pages(&self, words_per_page: usize) -> usize {
        count_pages(self.total_words, words_per_page)
    }

    /// Index of the chapter holding the given global word position.
    pub fn locate(&self, word: usize) -> Option<usize> {
        // The last chapter starting at or before `word`; empty chapters that
        // share its start come earlier and are skipped.
        let idx = self
            .chapters
            .partition_point(|c| c.words_before <= word)
            .checked_sub(1)?;
        self.chapters[idx].contains(word).then_some(idx)
    }
}

/// Fetches every chapter of `book` concurrently, waits for all of them, and
/// indexes them in reading order. Any failing chapter fails the whole index.
pub async fn build_index(book: &dyn OpenedBook) -> PaginationResult<ChapterIndex> {
    let flow = book.flow();
    let mut pending: FuturesUnordered<_> = flow
        .iter()
        .map(|entry| async move {
            let markup = book.chapter_markup(entry).await?;
            let words = count_words(&strip_markup(&markup));
            Ok::<_, PortError>((entry, words))
        })
        .collect();

    let mut counted = Vec::with_capacity(flow.len());
    while let Some(result) = pending.next().await {
        let (entry, words) = result.map_err(|e| {
            PaginationError::DocumentParse(format!("chapter extraction failed: {e}"))
        })?;
        debug!(chapter = %entry.id, position = entry.position, words, "Counted chapter");
        counted.push((entry.clone(), words));
    }

    Ok(ChapterIndex::from_counts(counted))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    /// In-memory book whose chapters finish loading in reverse order.
    pub(crate) struct FakeBook {
        pub flow: Vec<FlowEntry>,
        pub chapters: Vec<Result<String, String>>,
    }

    impl FakeBook {
        pub(crate) fn new(chapters: &[(&str, Option<&str>)]) -> Self {
            Self {
                flow: chapters
                    .iter()
                    .enumerate()
                    .map(|(position, (_, title))| FlowEntry {
                        position,
                        id: format!("ch{position}"),
                        title: title.map(str::to_string),
                    })
                    .collect(),
                chapters: chapters.iter().map(|(m, _)| Ok(m.to_string())).collect(),
            }
        }

        pub(crate) fn with_word_counts(counts: &[usize]) -> Self {
            let markup: Vec<String> = counts
                .iter()
                .map(|n| format!("<p>{}</p>", vec!["word"; *n].join(" ")))
                .collect();
            let pairs: Vec<(&str, Option<&str>)> =
                markup.iter().map(|m| (m.as_str(), None)).collect();
            Self::new(&pairs)
        }
    }

    #[async_trait]
    impl OpenedBook for FakeBook {
        fn flow(&self) -> &[FlowEntry] {
            &self.flow
        }

        async fn chapter_markup(&self, entry: &FlowEntry) -> Result<String, PortError> {
            let delay = (self.flow.len() - entry.position) as u64;
            tokio::time::sleep(Duration::from_millis(delay * 5)).await;
            self.chapters[entry.position]
                .clone()
                .map_err(PortError::Unexpected)
        }
    }

    #[tokio::test]
    async fn index_is_in_reading_order_despite_out_of_order_fetches() {
        let book = FakeBook::new(&[
            ("<h1>One</h1>\n<p>a b c</p>", Some("Opening")),
            ("<p>d e</p>", None),
            ("<p>f g h i</p>", Some("Finale")),
        ]);
        let index = build_index(&book).await.unwrap();

        let ids: Vec<&str> = index.chapters().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["ch0", "ch1", "ch2"]);
        let counts: Vec<usize> = index.chapters().iter().map(|c| c.word_count).collect();
        assert_eq!(counts, vec![4, 2, 4]);
        let before: Vec<usize> = index.chapters().iter().map(|c| c.words_before).collect();
        assert_eq!(before, vec![0, 4, 6]);
        assert_eq!(index.total_words(), 10);
    }

    #[tokio::test]
    async fn word_counts_sum_to_flattened_total() {
        let markup = [
            "<html><body><p>The quick brown fox</p></body></html>",
            "<div>jumps <b>over</b> the</div>",
            "",
            "<p>lazy\n\ndog.</p>",
        ];
        let pairs: Vec<(&str, Option<&str>)> = markup.iter().map(|m| (*m, None)).collect();
        let index = build_index(&FakeBook::new(&pairs)).await.unwrap();

        let flattened: String = markup
            .iter()
            .map(|m| strip_markup(m).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        let sum: usize = index.chapters().iter().map(|c| c.word_count).sum();
        assert_eq!(sum, index.total_words());
        assert_eq!(sum, count_words(&flattened));
        assert!(index
            .chapters()
            .windows(2)
            .all(|w| w[0].words_before <= w[1].words_before));
    }

    #[tokio::test]
    async fn one_failing_chapter_fails_the_index() {
        let mut book = FakeBook::with_word_counts(&[3, 3, 3]);
        book.chapters[1] = Err("corrupt chapter".to_string());
        let err = build_index(&book).await.unwrap_err();
        assert!(matches!(err, PaginationError::DocumentParse(_)));
    }

    #[test]
    fn locate_finds_the_unique_containing_chapter() {
        let flow = |position: usize| FlowEntry {
            position,
            id: format!("ch{position}"),
            title: None,
        };
        let index = ChapterIndex::from_counts(vec![
            (flow(0), 0),
            (flow(1), 5),
            (flow(2), 0),
            (flow(3), 3),
            (flow(4), 0),
        ]);

        assert_eq!(index.locate(0), Some(1));
        assert_eq!(index.locate(4), Some(1));
        assert_eq!(index.locate(5), Some(3));
        assert_eq!(index.locate(7), Some(3));
        assert_eq!(index.locate(8), None);

        for word in 0..index.total_words() {
            let holders = index.chapters().iter().filter(|c| c.contains(word)).count();
            assert_eq!(holders, 1);
        }
    }

    #[test]
    fn empty_book_has_no_pages() {
        let index = ChapterIndex::from_counts(Vec::new());
        assert!(index.is_empty());
        assert_eq!(index.total_pages(600), 0);
        assert_eq!(index.locate(0), None);
    }
}
