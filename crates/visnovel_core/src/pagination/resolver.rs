//! Maps a global page number onto a chapter of an EPUB.

use super::chapters::ChapterIndex;
use super::text::PageWindow;
use serde::Serialize;

/// Where a page starts inside an EPUB and how much of the chapter it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPosition {
    pub chapter_index: usize,
    #[serde(skip)]
    pub chapter_id: String,
    pub chapter_title: String,
    /// Words of the chapter that precede the page's first word.
    pub word_offset: usize,
    /// Words to show from `word_offset`, capped at the chapter's end.
    pub words_to_take: usize,
    pub total_chapters: usize,
}

/// Resolves `page` against the index. `None` for page 0 and for pages that
/// start past the last word of the book.
pub fn resolve(index: &ChapterIndex, page: usize, words_per_page: usize) -> Option<ChapterPosition> {
    let window = PageWindow::new(page, words_per_page, index.total_words())?;
    if window.is_past_end(index.total_words()) {
        return None;
    }

    let chapter_index = index.locate(window.start_word)?;
    let chapter = &index.chapters()[chapter_index];
    let word_offset = window.start_word - chapter.words_before;
    let words_to_take = words_per_page.min(chapter.word_count - word_offset);

    Some(ChapterPosition {
        chapter_index,
        chapter_id: chapter.id.clone(),
        chapter_title: chapter
            .title
            .clone()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| format!("Chapter {}", chapter_index + 1)),
        word_offset,
        words_to_take,
        total_chapters: index.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FlowEntry;

    fn index(chapters: &[(usize, Option<&str>)]) -> ChapterIndex {
        ChapterIndex::from_counts(chapters.iter().enumerate().map(|(position, (words, title))| {
            (
                FlowEntry {
                    position,
                    id: format!("ch{position}"),
                    title: title.map(str::to_string),
                },
                *words,
            )
        }))
    }

    #[test]
    fn two_chapters_of_500_and_700_words() {
        let index = index(&[(500, Some("Arrival")), (700, None)]);

        let first = resolve(&index, 1, 600).unwrap();
        assert_eq!(first.chapter_index, 0);
        assert_eq!(first.chapter_title, "Arrival");
        assert_eq!(first.word_offset, 0);
        assert_eq!(first.words_to_take, 500);
        assert_eq!(first.total_chapters, 2);

        let second = resolve(&index, 2, 600).unwrap();
        assert_eq!(second.chapter_index, 1);
        assert_eq!(second.chapter_title, "Chapter 2");
        assert_eq!(second.word_offset, 100);
        assert_eq!(second.words_to_take, 600);
    }

    #[test]
    fn page_past_the_book_resolves_to_nothing() {
        let index = index(&[(500, None), (700, None)]);
        assert_eq!(index.total_pages(600), 2);
        assert!(resolve(&index, 3, 600).is_none());
        assert!(resolve(&index, 0, 600).is_none());
    }

    #[test]
    fn every_valid_page_lands_in_its_containing_chapter() {
        let index = index(&[(0, None), (120, None), (35, None), (0, None), (410, None)]);
        let words_per_page = 50;
        for page in 1..=index.total_pages(words_per_page) {
            let start = (page - 1) * words_per_page;
            let position = resolve(&index, page, words_per_page).unwrap();
            let chapter = &index.chapters()[position.chapter_index];
            assert!(chapter.words_before <= start);
            assert!(start < chapter.words_before + chapter.word_count);
            assert!(position.words_to_take >= 1);
            assert!(position.word_offset + position.words_to_take <= chapter.word_count);
        }
    }

    #[test]
    fn blank_titles_fall_back_to_numbered_chapters() {
        let index = index(&[(10, Some("  "))]);
        assert_eq!(resolve(&index, 1, 5).unwrap().chapter_title, "Chapter 1");
    }
}
