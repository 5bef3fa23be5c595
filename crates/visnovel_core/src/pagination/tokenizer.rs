//! Whitespace word tokenization with byte positions.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

/// Byte range of one word inside the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordSpan {
    pub start: usize,
    pub end: usize,
}

impl WordSpan {
    pub fn as_str<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Iterates over the maximal runs of non-whitespace characters in `text`.
pub fn word_spans(text: &str) -> WordSpans<'_> {
    WordSpans {
        text,
        chars: text.char_indices(),
    }
}

pub struct WordSpans<'a> {
    text: &'a str,
    chars: std::str::CharIndices<'a>,
}

impl Iterator for WordSpans<'_> {
    type Item = WordSpan;

    fn next(&mut self) -> Option<WordSpan> {
        let start = loop {
            let (idx, c) = self.chars.next()?;
            if !c.is_whitespace() {
                break idx;
            }
        };
        for (idx, c) in self.chars.by_ref() {
            if c.is_whitespace() {
                return Some(WordSpan { start, end: idx });
            }
        }
        Some(WordSpan {
            start,
            end: self.text.len(),
        })
    }
}

pub fn count_words(text: &str) -> usize {
    word_spans(text).count()
}

/// Byte offset of the `n`-th word (0-based), if the text has that many words.
#[cfg(test)]
pub(crate) fn nth_word_start(text: &str, n: usize) -> Option<usize> {
    word_spans(text).nth(n).map(|span| span.start)
}

/// Drops every `<...>` tag so chapter markup can be word-counted.
pub fn strip_markup(markup: &str) -> Cow<'_, str> {
    TAG.replace_all(markup, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_cover_words_and_skip_any_whitespace() {
        let text = "  one\ttwo\n\nthree  ";
        let words: Vec<&str> = word_spans(text).map(|s| s.as_str(text)).collect();
        assert_eq!(words, vec!["one", "two", "three"]);
        assert_eq!(count_words(text), 3);
    }

    #[test]
    fn final_word_runs_to_end_of_text() {
        let text = "alpha beta";
        let spans: Vec<WordSpan> = word_spans(text).collect();
        assert_eq!(spans[1], WordSpan { start: 6, end: 10 });
    }

    #[test]
    fn offsets_stay_on_char_boundaries() {
        let text = "café\u{00a0}naïve 日本語";
        let words: Vec<&str> = word_spans(text).map(|s| s.as_str(text)).collect();
        assert_eq!(words, vec!["café", "naïve", "日本語"]);
        assert_eq!(nth_word_start(text, 2), Some(text.find("日本語").unwrap()));
    }

    #[test]
    fn empty_and_blank_text_have_no_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words(" \n\t "), 0);
        assert_eq!(nth_word_start("", 0), None);
    }

    #[test]
    fn nth_word_start_finds_repeated_tokens_by_position() {
        let text = "the cat saw the dog";
        assert_eq!(nth_word_start(text, 3), Some(12));
        assert_eq!(nth_word_start(text, 5), None);
    }

    #[test]
    fn markup_is_removed_before_counting() {
        let html = "<p>Hello <em>brave</em> new</p>\n<p>world</p>";
        let plain = strip_markup(html);
        assert_eq!(count_words(&plain), 4);
        // Tags glued to words do not split or merge them.
        assert_eq!(count_words(&strip_markup("<b>a</b><i>b</i>")), 1);
    }
}
