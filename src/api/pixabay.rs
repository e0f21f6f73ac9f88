use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{download_to, http_client, VisualSource};
use crate::error::{PipelineError, Result};
use crate::visual::VisualKind;

const PIXABAY_API: &str = "https://pixabay.com";
/// Pixabay rejects longer `q` values.
const MAX_QUERY_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct PixabayClient {
    api_key: String,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ImageSearch {
    #[serde(default)]
    hits: Vec<ImageHit>,
}

#[derive(Debug, Deserialize)]
struct ImageHit {
    #[serde(rename = "largeImageURL")]
    large_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoSearch {
    #[serde(default)]
    hits: Vec<VideoHit>,
}

#[derive(Debug, Deserialize)]
struct VideoHit {
    videos: VideoRenditions,
}

#[derive(Debug, Deserialize)]
struct VideoRenditions {
    medium: Option<Rendition>,
    small: Option<Rendition>,
    large: Option<Rendition>,
}

#[derive(Debug, Deserialize)]
struct Rendition {
    url: String,
}

impl VideoRenditions {
    /// Medium first, then small, then large.
    fn preferred_url(&self) -> Option<String> {
        [&self.medium, &self.small, &self.large]
            .into_iter()
            .flatten()
            .map(|r| r.url.clone())
            .find(|url| !url.is_empty())
    }
}

/// Cuts `query` to at most [`MAX_QUERY_CHARS`] characters on a word boundary.
fn clamp_query(query: &str) -> &str {
    let query = query.trim();
    if query.chars().count() <= MAX_QUERY_CHARS {
        return query;
    }
    let limit = query
        .char_indices()
        .nth(MAX_QUERY_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(query.len());
    // Keep whole words when the cut lands inside one.
    let cut = if query[limit..].starts_with(char::is_whitespace) {
        limit
    } else {
        query[..limit].rfind(char::is_whitespace).unwrap_or(limit)
    };
    query[..cut].trim_end()
}

impl PixabayClient {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            api_key,
            client: http_client(Duration::from_secs(120))?,
            base_url: PIXABAY_API.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn search_image(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/api/", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("per_page", "10"),
                ("orientation", "vertical"),
                ("image_type", "photo"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(PipelineError::ApiError(format!(
                "Pixabay image search error: {}",
                error_text
            )));
        }

        let search: ImageSearch = response.json().await?;
        let urls: Vec<String> = search
            .hits
            .into_iter()
            .filter_map(|hit| hit.large_image_url)
            .filter(|url| !url.is_empty())
            .collect();
        urls.choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| PipelineError::ApiError(format!("Pixabay has no image for '{}'", query)))
    }

    async fn search_clip(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/api/videos/", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("per_page", "10"),
                ("video_type", "film"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(PipelineError::ApiError(format!(
                "Pixabay video search error: {}",
                error_text
            )));
        }

        let search: VideoSearch = response.json().await?;
        let urls: Vec<String> = search
            .hits
            .iter()
            .take(5)
            .filter_map(|hit| hit.videos.preferred_url())
            .collect();
        urls.choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| PipelineError::ApiError(format!("Pixabay has no clip for '{}'", query)))
    }
}

#[async_trait]
impl VisualSource for PixabayClient {
    fn name(&self) -> &'static str {
        "pixabay"
    }

    async fn fetch(&self, kind: VisualKind, query: &str, dest: &Path) -> Result<()> {
        let query = clamp_query(query);
        let url = match kind {
            VisualKind::Image => self.search_image(query).await?,
            VisualKind::Clip => self.search_clip(query).await?,
        };
        let bytes = download_to(&self.client, &url, dest).await?;
        info!("Pixabay {} for '{}' saved to {} ({} bytes)", kind, query, dest.display(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn medium_rendition_is_preferred() {
        let renditions = VideoRenditions {
            medium: Some(Rendition { url: String::new() }),
            small: Some(Rendition { url: "small.mp4".into() }),
            large: Some(Rendition { url: "large.mp4".into() }),
        };
        assert_eq!(renditions.preferred_url().as_deref(), Some("small.mp4"));
    }

    #[test]
    fn long_queries_are_cut_on_a_word_boundary() {
        assert_eq!(clamp_query("  harbor night "), "harbor night");

        let long = "bank vault door dark corridor ".repeat(6);
        let clamped = clamp_query(&long);
        assert!(clamped.chars().count() <= MAX_QUERY_CHARS);
        assert!(long.starts_with(clamped));
        assert!(long[clamped.len()..].starts_with(' '));

        let one_word = "x".repeat(150);
        assert_eq!(clamp_query(&one_word).chars().count(), MAX_QUERY_CHARS);
    }

    #[tokio::test]
    async fn oversized_query_is_shortened_before_searching() {
        let long = "stock market crash screen trader panic desk ".repeat(4);
        let expected = clamp_query(&long).to_string();
        assert!(expected.len() < long.trim().len());

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/"))
            .and(query_param("q", expected.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [{"largeImageURL": format!("{}/i/crash.jpg", server.uri())}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/i/crash.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpg".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("beat_01_source.jpg");
        let client = PixabayClient::new("secret".into()).unwrap().with_base_url(server.uri());
        client.fetch(VisualKind::Image, &long, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"jpg".to_vec());
    }

    #[tokio::test]
    async fn fetches_clip_for_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/videos/"))
            .and(query_param("key", "secret"))
            .and(query_param("q", "harbor night"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [{"videos": {"medium": {"url": format!("{}/v/harbor.mp4", server.uri())}}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v/harbor.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4data".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("beat_02_source.mp4");
        let client = PixabayClient::new("secret".into()).unwrap().with_base_url(server.uri());
        client.fetch(VisualKind::Clip, "harbor night", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"mp4data".to_vec());
    }
}
