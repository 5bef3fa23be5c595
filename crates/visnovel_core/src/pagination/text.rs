//! Plain-text pagination by word count.

use super::tokenizer::word_spans;
use std::ops::Range;

/// The half-open word range `[start_word, end_word)` covered by one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: usize,
    pub start_word: usize,
    pub end_word: usize,
}

impl PageWindow {
    /// Returns `None` for page 0. The window of a page past the end of the
    /// document is empty (`start_word >= total_words`).
    pub fn new(page: usize, words_per_page: usize, total_words: usize) -> Option<Self> {
        if page == 0 || words_per_page == 0 {
            return None;
        }
        let start_word = (page - 1).saturating_mul(words_per_page);
        let end_word = start_word
            .saturating_add(words_per_page)
            .min(total_words)
            .max(start_word);
        Some(Self {
            page,
            start_word,
            end_word,
        })
    }

    pub fn is_past_end(&self, total_words: usize) -> bool {
        self.start_word >= total_words
    }
}

/// `ceil(total_words / words_per_page)`; an empty document has no pages.
pub fn count_pages(total_words: usize, words_per_page: usize) -> usize {
    if words_per_page == 0 {
        return 0;
    }
    total_words.div_ceil(words_per_page)
}

/// Byte offsets at which each page of a text starts.
///
/// Computed once per file and page size; a page is then cut out of the text
/// without tokenizing it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLayout {
    words_per_page: usize,
    total_words: usize,
    byte_len: usize,
    page_starts: Vec<usize>,
}

impl TextLayout {
    pub fn scan(text: &str, words_per_page: usize) -> Self {
        let words_per_page = words_per_page.max(1);
        let mut page_starts = Vec::new();
        let mut total_words = 0usize;
        for (idx, span) in word_spans(text).enumerate() {
            if idx % words_per_page == 0 {
                // Page 1 owns any leading whitespace.
                page_starts.push(if idx == 0 { 0 } else { span.start });
            }
            total_words += 1;
        }
        Self {
            words_per_page,
            total_words,
            byte_len: text.len(),
            page_starts,
        }
    }

    pub fn words_per_page(&self) -> usize {
        self.words_per_page
    }

    pub fn total_words(&self) -> usize {
        self.total_words
    }

    pub fn total_pages(&self) -> usize {
        self.page_starts.len()
    }

    /// Whether `text` can be sliced with this layout.
    pub fn fits(&self, text: &str) -> bool {
        text.len() == self.byte_len
    }

    /// Byte range of a page, from its first word up to the first word of the
    /// following page (or the end of the text). `None` for page 0 and for
    /// pages past the end.
    pub fn page_range(&self, page: usize) -> Option<Range<usize>> {
        let start = *self.page_starts.get(page.checked_sub(1)?)?;
        let end = self
            .page_starts
            .get(page)
            .copied()
            .unwrap_or(self.byte_len);
        Some(start..end)
    }

    /// Cuts a page out of `text`, which must be the text this layout was
    /// scanned from.
    pub fn slice<'a>(&self, text: &'a str, page: usize) -> Option<&'a str> {
        if !self.fits(text) {
            return None;
        }
        let range = self.page_range(page)?;
        text.get(range)
    }
}

/// One-shot page lookup: the exact substring of `text` covering `page`, or an
/// empty string when the page starts past the last word.
#[cfg(test)]
pub(crate) fn page_text(text: &str, page: usize, words_per_page: usize) -> &str {
    TextLayout::scan(text, words_per_page)
        .slice(text, page)
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::tokenizer::count_words;

    const SEVEN: &str = "one two three four five six seven";

    #[test]
    fn window_follows_page_arithmetic() {
        let w = PageWindow::new(2, 3, 7).unwrap();
        assert_eq!((w.start_word, w.end_word), (3, 6));

        let last = PageWindow::new(3, 3, 7).unwrap();
        assert_eq!((last.start_word, last.end_word), (6, 7));

        let past = PageWindow::new(4, 3, 7).unwrap();
        assert!(past.is_past_end(7));
        assert!(PageWindow::new(0, 3, 7).is_none());
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(count_pages(7, 3), 3);
        assert_eq!(count_pages(6, 3), 2);
        assert_eq!(count_pages(1, 600), 1);
        assert_eq!(count_pages(0, 600), 0);
    }

    #[test]
    fn seven_words_three_per_page() {
        let layout = TextLayout::scan(SEVEN, 3);
        assert_eq!(layout.total_pages(), 3);
        assert_eq!(layout.slice(SEVEN, 1), Some("one two three "));
        assert_eq!(layout.slice(SEVEN, 2), Some("four five six "));
        assert_eq!(layout.slice(SEVEN, 3), Some("seven"));
        assert_eq!(layout.slice(SEVEN, 4), None);
        assert_eq!(page_text(SEVEN, 4, 3), "");
    }

    #[test]
    fn pages_keep_original_formatting() {
        let text = "First  line\n\n  Second\tline here\nlast";
        assert_eq!(page_text(text, 1, 2), "First  line\n\n  ");
        assert_eq!(page_text(text, 2, 2), "Second\tline ");
        assert_eq!(page_text(text, 3, 2), "here\nlast");
    }

    #[test]
    fn concatenated_pages_reproduce_the_document() {
        let text = "\n  Chapter 1\n\nIt was a dark   and stormy night;\n\tthe rain fell in torrents.\n\n";
        for words_per_page in 1..=8 {
            let layout = TextLayout::scan(text, words_per_page);
            let joined: String = (1..=layout.total_pages())
                .map(|p| layout.slice(text, p).unwrap())
                .collect();
            assert_eq!(joined, text, "words_per_page = {words_per_page}");
        }
    }

    #[test]
    fn page_count_agrees_with_word_count() {
        let text = "a b c d e f g h i j k";
        for words_per_page in 1..=12 {
            let layout = TextLayout::scan(text, words_per_page);
            assert_eq!(
                layout.total_pages(),
                count_pages(count_words(text), words_per_page)
            );
        }
    }

    #[test]
    fn empty_document_has_no_pages() {
        let layout = TextLayout::scan("   \n", 600);
        assert_eq!(layout.total_words(), 0);
        assert_eq!(layout.total_pages(), 0);
        assert_eq!(layout.page_range(1), None);
    }

    #[test]
    fn repeated_words_do_not_confuse_page_boundaries() {
        let text = "the the the the the the";
        assert_eq!(page_text(text, 2, 4), "the the");
        assert_eq!(page_text(text, 1, 4), "the the the the ");
    }

    #[test]
    fn slice_refuses_text_of_a_different_length() {
        let layout = TextLayout::scan(SEVEN, 3);
        assert_eq!(layout.slice("one two", 1), None);
    }
}
