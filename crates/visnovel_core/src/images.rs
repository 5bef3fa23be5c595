//! crates/visnovel_core/src/images.rs
//!
//! Prompt construction for page illustrations and the ordered chain of image
//! generation strategies.

use crate::domain::GenerationMethod;
use crate::ports::{ImageStrategy, StrategyOutcome};
use std::sync::Arc;
use tracing::{info, warn};

/// Longest scene description sent to a provider before styling.
pub const MAX_SCENE_CHARS: usize = 500;
/// Hard cap on the final, styled prompt.
pub const MAX_PROMPT_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageStyle {
    #[default]
    Default,
    Anime,
    Realistic,
    Artistic,
    Fantasy,
}

impl ImageStyle {
    /// Unknown styles render with the default look.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "anime" => ImageStyle::Anime,
            "realistic" => ImageStyle::Realistic,
            "artistic" => ImageStyle::Artistic,
            "fantasy" => ImageStyle::Fantasy,
            _ => ImageStyle::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStyle::Default => "default",
            ImageStyle::Anime => "anime",
            ImageStyle::Realistic => "realistic",
            ImageStyle::Artistic => "artistic",
            ImageStyle::Fantasy => "fantasy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// The styled prompt handed to providers.
    pub prompt: String,
    pub style: ImageStyle,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    /// File extension without the dot.
    pub extension: &'static str,
}

/// The outcome of a full chain run.
#[derive(Debug)]
pub struct ChainSuccess {
    pub image: GeneratedImage,
    pub method: GenerationMethod,
    pub strategy: &'static str,
    /// Failures of strategies tried before the winning one.
    pub earlier_failures: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("image strategy {strategy} failed fatally: {reason}")]
    Fatal { strategy: &'static str, reason: String },
    #[error("no image strategy succeeded ({})", .failures.join("; "))]
    Exhausted { failures: Vec<String> },
}

/// Cuts `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Collapses runs of whitespace (newlines included) into single spaces.
pub fn clean_passage(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Builds the provider prompt for a scene, decorated for the requested style.
pub fn styled_prompt(scene: &str, title: &str, style: ImageStyle) -> String {
    let scene = if scene.chars().count() > MAX_SCENE_CHARS {
        format!("{}...", truncate_chars(scene, MAX_SCENE_CHARS))
    } else {
        scene.to_string()
    };

    let (modifiers, title_phrase) = match style {
        ImageStyle::Anime => (
            "anime style illustration, detailed anime artwork, vibrant colors, high quality anime illustration",
            "from anime",
        ),
        ImageStyle::Realistic => (
            "realistic detailed illustration, photorealistic, high resolution photography, cinematic lighting",
            "from the novel",
        ),
        ImageStyle::Artistic => (
            "artistic digital painting, vibrant colors, detailed artwork, professional illustration",
            "inspired by",
        ),
        ImageStyle::Fantasy => (
            "fantasy art style, magical atmosphere, ethereal lighting, detailed fantasy scene, epic fantasy illustration",
            "from fantasy world of",
        ),
        ImageStyle::Default => (
            "detailed illustration, high quality artwork, professional digital art",
            "from",
        ),
    };

    let mut prompt = format!("{scene}, {modifiers}");
    if !title.trim().is_empty() {
        prompt.push_str(&format!(", {title_phrase} \"{}\"", title.trim()));
    }
    truncate_chars(&prompt, MAX_PROMPT_CHARS).to_string()
}

/// Image strategies tried in order until one produces a picture.
#[derive(Clone, Default)]
pub struct ImageChain {
    strategies: Vec<Arc<dyn ImageStrategy>>,
}

impl ImageChain {
    pub fn new(strategies: Vec<Arc<dyn ImageStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn generate(&self, request: &ImageRequest) -> Result<ChainSuccess, ChainError> {
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match strategy.generate(request).await {
                StrategyOutcome::Generated(image) => {
                    info!(
                        strategy = strategy.name(),
                        bytes = image.bytes.len(),
                        skipped = failures.len(),
                        "Image strategy satisfied the request"
                    );
                    return Ok(ChainSuccess {
                        image,
                        method: strategy.method(),
                        strategy: strategy.name(),
                        earlier_failures: failures,
                    });
                }
                StrategyOutcome::Retryable(reason) => {
                    warn!(strategy = strategy.name(), %reason, "Image strategy failed, trying next");
                    failures.push(format!("{}: {}", strategy.name(), reason));
                }
                StrategyOutcome::Fatal(reason) => {
                    warn!(strategy = strategy.name(), %reason, "Image strategy failed fatally");
                    return Err(ChainError::Fatal {
                        strategy: strategy.name(),
                        reason,
                    });
                }
            }
        }
        Err(ChainError::Exhausted { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        outcome: fn() -> StrategyOutcome,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, outcome: fn() -> StrategyOutcome) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ImageStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn method(&self) -> GenerationMethod {
            if self.name == "placeholder" {
                GenerationMethod::Placeholder
            } else {
                GenerationMethod::Cloudflare
            }
        }

        async fn generate(&self, _request: &ImageRequest) -> StrategyOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    fn request() -> ImageRequest {
        ImageRequest {
            prompt: "a lighthouse at dusk".to_string(),
            style: ImageStyle::Default,
            title: "Tides".to_string(),
        }
    }

    fn png() -> StrategyOutcome {
        StrategyOutcome::Generated(GeneratedImage {
            bytes: vec![1, 2, 3],
            extension: "png",
        })
    }

    #[tokio::test]
    async fn falls_through_retryable_failures() {
        let remote = Scripted::new("cloudflare", || StrategyOutcome::Retryable("rate limited".into()));
        let local = Scripted::new("placeholder", png);
        let chain = ImageChain::new(vec![remote.clone() as Arc<dyn ImageStrategy>, local.clone()]);

        let success = chain.generate(&request()).await.unwrap();
        assert_eq!(success.method, GenerationMethod::Placeholder);
        assert_eq!(success.strategy, "placeholder");
        assert_eq!(success.earlier_failures, vec!["cloudflare: rate limited".to_string()]);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_success_stops_the_chain() {
        let remote = Scripted::new("cloudflare", png);
        let local = Scripted::new("placeholder", png);
        let chain = ImageChain::new(vec![remote as Arc<dyn ImageStrategy>, local.clone()]);

        let success = chain.generate(&request()).await.unwrap();
        assert_eq!(success.method, GenerationMethod::Cloudflare);
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fatal_failure_aborts_remaining_strategies() {
        let remote = Scripted::new("cloudflare", || StrategyOutcome::Fatal("prompt rejected".into()));
        let local = Scripted::new("placeholder", png);
        let chain = ImageChain::new(vec![remote as Arc<dyn ImageStrategy>, local.clone()]);

        let err = chain.generate(&request()).await.unwrap_err();
        assert!(matches!(err, ChainError::Fatal { strategy: "cloudflare", .. }));
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_chain_is_exhausted() {
        let err = ImageChain::default().generate(&request()).await.unwrap_err();
        assert!(matches!(err, ChainError::Exhausted { failures } if failures.is_empty()));
    }

    #[test]
    fn prompt_is_styled_and_titled() {
        let prompt = styled_prompt("a misty harbor", "Tides", ImageStyle::Fantasy);
        assert!(prompt.starts_with("a misty harbor, fantasy art style"));
        assert!(prompt.ends_with(", from fantasy world of \"Tides\""));

        let untitled = styled_prompt("a misty harbor", "", ImageStyle::Default);
        assert_eq!(
            untitled,
            "a misty harbor, detailed illustration, high quality artwork, professional digital art"
        );
    }

    #[test]
    fn long_scenes_are_truncated() {
        let scene = "ø".repeat(MAX_SCENE_CHARS + 50);
        let prompt = styled_prompt(&scene, "", ImageStyle::Anime);
        assert!(prompt.starts_with(&format!("{}...", "ø".repeat(MAX_SCENE_CHARS))));
        assert!(prompt.chars().count() <= MAX_PROMPT_CHARS);
    }

    #[test]
    fn passages_are_cleaned_and_styles_parsed() {
        assert_eq!(clean_passage("  The\n\nrain\tfell  "), "The rain fell");
        assert_eq!(ImageStyle::parse("Anime"), ImageStyle::Anime);
        assert_eq!(ImageStyle::parse("watercolor"), ImageStyle::Default);
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
