//! services/api/src/adapters/images.rs
//!
//! Concrete `ImageStrategy` implementations: Cloudflare Workers AI for real
//! illustrations and a local PNG renderer that always succeeds.

use async_trait::async_trait;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use reqwest::StatusCode;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::debug;
use visnovel_core::domain::GenerationMethod;
use visnovel_core::images::{GeneratedImage, ImageRequest, ImageStyle};
use visnovel_core::ports::{ImageStrategy, StrategyOutcome};

use crate::config::CloudflareCredentials;

const CLOUDFLARE_API: &str = "https://api.cloudflare.com/client/v4/accounts";
const CLOUDFLARE_MODEL: &str = "@cf/stabilityai/stable-diffusion-xl-base-1.0";

pub const IMAGE_SIZE: u32 = 512;

//=========================================================================================
// Cloudflare Workers AI
//=========================================================================================

#[derive(Serialize)]
struct TextToImageRequest<'a> {
    prompt: &'a str,
    num_steps: u32,
    width: u32,
    height: u32,
}

pub struct CloudflareImageStrategy {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
}

impl CloudflareImageStrategy {
    pub fn new(credentials: &CloudflareCredentials) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/ai/run/{}",
                CLOUDFLARE_API, credentials.account_id, CLOUDFLARE_MODEL
            ),
            api_token: credentials.api_token.clone(),
        })
    }
}

/// A rejected request (bad prompt) fails every provider; anything else is
/// worth handing to the next strategy.
fn classify_failure(status: StatusCode, body: &str) -> StrategyOutcome {
    let reason = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::BAD_REQUEST {
        StrategyOutcome::Fatal(reason)
    } else {
        StrategyOutcome::Retryable(reason)
    }
}

#[async_trait]
impl ImageStrategy for CloudflareImageStrategy {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    fn method(&self) -> GenerationMethod {
        GenerationMethod::Cloudflare
    }

    async fn generate(&self, request: &ImageRequest) -> StrategyOutcome {
        let body = TextToImageRequest {
            prompt: &request.prompt,
            num_steps: 20,
            width: IMAGE_SIZE,
            height: IMAGE_SIZE,
        };
        let response = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return StrategyOutcome::Retryable(format!("request failed: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return classify_failure(status, &text);
        }

        match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() => {
                debug!(bytes = bytes.len(), "Cloudflare returned an image");
                StrategyOutcome::Generated(GeneratedImage {
                    bytes: bytes.to_vec(),
                    extension: "png",
                })
            }
            Ok(_) => StrategyOutcome::Retryable("empty image body".to_string()),
            Err(e) => StrategyOutcome::Retryable(format!("reading image body failed: {e}")),
        }
    }
}

//=========================================================================================
// Local placeholder
//=========================================================================================

/// Renders a gradient whose palette follows the style and whose angle
/// follows the prompt, so different pages get different pictures.
#[derive(Clone, Default)]
pub struct PlaceholderImageStrategy;

impl PlaceholderImageStrategy {
    pub fn new() -> Self {
        Self
    }
}

fn palette(style: ImageStyle) -> ([u8; 3], [u8; 3]) {
    match style {
        ImageStyle::Default => ([58, 80, 107], [224, 214, 190]),
        ImageStyle::Anime => ([255, 143, 171], [120, 196, 255]),
        ImageStyle::Realistic => ([52, 61, 47], [186, 170, 140]),
        ImageStyle::Artistic => ([142, 45, 226], [255, 190, 90]),
        ImageStyle::Fantasy => ([25, 20, 70], [110, 230, 200]),
    }
}

fn mix(from: u8, to: u8, t: f32) -> u8 {
    (f32::from(from) + (f32::from(to) - f32::from(from)) * t).round() as u8
}

pub fn render_placeholder(prompt: &str, style: ImageStyle, size: u32) -> Result<Vec<u8>, image::ImageError> {
    let mut hasher = DefaultHasher::new();
    prompt.hash(&mut hasher);
    let angle = (hasher.finish() % 360) as f32 * std::f32::consts::PI / 180.0;
    let (dx, dy) = (angle.cos(), angle.sin());
    let (start, end) = palette(style);
    let span = size.max(1) as f32;

    let canvas = RgbImage::from_fn(size, size, |x, y| {
        let u = x as f32 / span - 0.5;
        let v = y as f32 / span - 0.5;
        let t = ((u * dx + v * dy) / std::f32::consts::SQRT_2 + 0.5).clamp(0.0, 1.0);
        Rgb([
            mix(start[0], end[0], t),
            mix(start[1], end[1], t),
            mix(start[2], end[2], t),
        ])
    });

    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(canvas.as_raw(), size, size, ExtendedColorType::Rgb8)?;
    Ok(png)
}

#[async_trait]
impl ImageStrategy for PlaceholderImageStrategy {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn method(&self) -> GenerationMethod {
        GenerationMethod::Placeholder
    }

    async fn generate(&self, request: &ImageRequest) -> StrategyOutcome {
        let prompt = request.prompt.clone();
        let style = request.style;
        let rendered =
            tokio::task::spawn_blocking(move || render_placeholder(&prompt, style, IMAGE_SIZE)).await;
        match rendered {
            Ok(Ok(bytes)) => StrategyOutcome::Generated(GeneratedImage {
                bytes,
                extension: "png",
            }),
            Ok(Err(e)) => StrategyOutcome::Retryable(format!("placeholder encoding failed: {e}")),
            Err(e) => StrategyOutcome::Retryable(format!("placeholder worker failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

    #[test]
    fn bad_requests_are_fatal_and_the_rest_retryable() {
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, "NSFW prompt"),
            StrategyOutcome::Fatal(reason) if reason == "HTTP 400: NSFW prompt"
        ));
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(matches!(classify_failure(status, ""), StrategyOutcome::Retryable(_)));
        }
    }

    #[test]
    fn endpoint_targets_the_account() {
        let strategy = CloudflareImageStrategy::new(&CloudflareCredentials {
            account_id: "acc123".to_string(),
            api_token: "token".to_string(),
        })
        .unwrap();
        assert_eq!(
            strategy.endpoint,
            "https://api.cloudflare.com/client/v4/accounts/acc123/ai/run/@cf/stabilityai/stable-diffusion-xl-base-1.0"
        );
    }

    #[test]
    fn placeholders_are_deterministic_pngs() {
        let first = render_placeholder("a misty harbor", ImageStyle::Fantasy, 16).unwrap();
        let again = render_placeholder("a misty harbor", ImageStyle::Fantasy, 16).unwrap();
        let other = render_placeholder("a misty harbor", ImageStyle::Anime, 16).unwrap();
        assert!(first.starts_with(PNG_MAGIC));
        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn placeholder_strategy_always_generates() {
        let request = ImageRequest {
            prompt: "a lighthouse at dusk".to_string(),
            style: ImageStyle::Default,
            title: "Tides".to_string(),
        };
        match PlaceholderImageStrategy::new().generate(&request).await {
            StrategyOutcome::Generated(image) => {
                assert_eq!(image.extension, "png");
                assert!(image.bytes.starts_with(PNG_MAGIC));
            }
            other => panic!("expected an image, got {other:?}"),
        }
    }
}
