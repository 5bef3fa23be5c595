//! services/api/src/adapters/summary.rs
//!
//! Condenses page text into short visual descriptions for image prompts.
//! `OpenAiSummaryAdapter` talks to the LLM; `CachedSummarizer` wraps it with
//! a bounded cache and falls back to plain truncation when the model is
//! unavailable or fails.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use visnovel_core::images::{clean_passage, truncate_chars};
use visnovel_core::ports::{PortError, PortResult, SummaryService};
use visnovel_core::BoundedCache;

/// Default cap on summary length, in characters.
pub const DEFAULT_SUMMARY_CHARS: usize = 200;

/// Longest slice of the passage sent to the model.
const MAX_PASSAGE_CHARS: usize = 1000;

//=========================================================================================
// The LLM Adapter
//=========================================================================================

/// An adapter that implements `SummaryService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiSummaryAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiSummaryAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

fn context_line(title: &str, chapter: &str) -> String {
    let mut context = String::new();
    if !title.is_empty() {
        context.push_str(&format!("Title: \"{}\". ", title));
    }
    if !chapter.is_empty() {
        context.push_str(&format!("Chapter: \"{}\". ", chapter));
    }
    context
}

#[async_trait]
impl SummaryService for OpenAiSummaryAdapter {
    async fn summarize(
        &self,
        text: &str,
        title: &str,
        chapter: &str,
        _max_len: usize,
    ) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(
                "You are a visual description expert. Extract the most visually descriptive elements from the text passage you are given. Focus on scenes, characters, environments, colors, actions, and visual details that would make a good image. Provide a concise description (maximum 75 words) that captures the visual essence. Do not include any commentary, just the visual description.")
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!(
                    "{}\n\nText passage: \"{}\"\n\nVisual description:",
                    context_line(title, chapter),
                    truncate_chars(text, MAX_PASSAGE_CHARS)
                ))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Summary LLM response contained no text content.".to_string())
            })
    }
}

//=========================================================================================
// Caching Wrapper
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SummaryKey {
    text: String,
    title: String,
    chapter: String,
    max_len: usize,
}

/// Summaries keyed by passage, title, chapter and length cap.
pub type SummaryCache = BoundedCache<SummaryKey, String>;

pub struct CachedSummarizer {
    inner: Option<Arc<dyn SummaryService>>,
    cache: Mutex<SummaryCache>,
}

impl CachedSummarizer {
    /// With no `inner` service every long passage is truncated.
    pub fn new(inner: Option<Arc<dyn SummaryService>>, cache: SummaryCache) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
        }
    }

    async fn fresh_summary(&self, text: &str, title: &str, chapter: &str, max_len: usize) -> String {
        let Some(inner) = &self.inner else {
            return truncate_chars(text, max_len).to_string();
        };
        match inner.summarize(text, title, chapter, max_len).await {
            Ok(raw) => tidy_summary(&raw, max_len),
            Err(e) => {
                warn!(error = %e, "Summarization failed, truncating passage instead");
                truncate_chars(text, max_len).to_string()
            }
        }
    }
}

#[async_trait]
impl SummaryService for CachedSummarizer {
    /// Never fails; the worst case is a truncated passage.
    async fn summarize(
        &self,
        text: &str,
        title: &str,
        chapter: &str,
        max_len: usize,
    ) -> PortResult<String> {
        let text = clean_passage(text);
        if text.chars().count() <= max_len {
            return Ok(text);
        }

        let key = SummaryKey {
            text,
            title: title.to_string(),
            chapter: chapter.to_string(),
            max_len,
        };
        if let Some(summary) = self.cache.lock().await.get(&key) {
            debug!("Using cached summary");
            return Ok(summary);
        }

        let summary = self.fresh_summary(&key.text, title, chapter, max_len).await;
        self.cache.lock().await.insert(key, summary.clone());
        Ok(summary)
    }
}

/// Trims the model's answer, drops wrapping quotes and enforces `max_len`.
fn tidy_summary(raw: &str, max_len: usize) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(['"', '\'']).unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(['"', '\'']).unwrap_or(trimmed);
    if trimmed.chars().count() > max_len {
        format!("{}...", truncate_chars(trimmed, max_len.saturating_sub(3)))
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(reply: Result<&'static str, &'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SummaryService for Scripted {
        async fn summarize(&self, _: &str, _: &str, _: &str, _: usize) -> PortResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .map_err(|e| PortError::Unexpected(e.to_string()))
        }
    }

    fn long_passage() -> String {
        "The lighthouse keeper climbed the stairs as the storm rolled in. ".repeat(10)
    }

    #[tokio::test]
    async fn short_passages_skip_the_model() {
        let model = Scripted::new(Ok("unused"));
        let summarizer = CachedSummarizer::new(Some(model.clone() as Arc<dyn SummaryService>), BoundedCache::new(8));

        let summary = summarizer.summarize("  A   quiet\n harbor ", "", "", 200).await.unwrap();
        assert_eq!(summary, "A quiet harbor");
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn summaries_are_tidied_and_cached() {
        let model = Scripted::new(Ok("  \"A lighthouse in a storm\"  "));
        let summarizer = CachedSummarizer::new(Some(model.clone() as Arc<dyn SummaryService>), BoundedCache::new(8));

        let first = summarizer.summarize(&long_passage(), "Tides", "One", 200).await.unwrap();
        let second = summarizer.summarize(&long_passage(), "Tides", "One", 200).await.unwrap();
        assert_eq!(first, "A lighthouse in a storm");
        assert_eq!(second, first);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        summarizer.summarize(&long_passage(), "Tides", "Two", 200).await.unwrap();
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_and_missing_models_truncate() {
        let model = Scripted::new(Err("quota exceeded"));
        let failing = CachedSummarizer::new(Some(model as Arc<dyn SummaryService>), BoundedCache::new(8));
        let summary = failing.summarize(&long_passage(), "", "", 40).await.unwrap();
        assert_eq!(summary, truncate_chars(&clean_passage(&long_passage()), 40));

        let offline = CachedSummarizer::new(None, BoundedCache::new(8));
        let summary = offline.summarize(&long_passage(), "", "", 40).await.unwrap();
        assert_eq!(summary.chars().count(), 40);
    }

    #[test]
    fn overlong_answers_are_capped_with_an_ellipsis() {
        let capped = tidy_summary(&"x".repeat(50), 20);
        assert_eq!(capped, format!("{}...", "x".repeat(17)));
        assert_eq!(tidy_summary("'Rain on glass'", 20), "Rain on glass");
    }
}
