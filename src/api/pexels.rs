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

const PEXELS_API: &str = "https://api.pexels.com";
/// Clip renditions are ranked by how close their width is to this.
const TARGET_CLIP_WIDTH: i64 = 720;

#[derive(Debug, Clone)]
pub struct PexelsClient {
    api_key: String,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PhotoSearch {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    src: PhotoSrc,
}

#[derive(Debug, Deserialize)]
struct PhotoSrc {
    large2x: String,
}

#[derive(Debug, Deserialize)]
struct VideoSearch {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    link: String,
    file_type: Option<String>,
    width: Option<i64>,
}

impl PexelsClient {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            api_key,
            client: http_client(Duration::from_secs(120))?,
            base_url: PEXELS_API.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn search_photo(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/v1/search", self.base_url))
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("per_page", "15"),
                ("orientation", "portrait"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(PipelineError::ApiError(format!(
                "Pexels photo search error: {}",
                error_text
            )));
        }

        let search: PhotoSearch = response.json().await?;
        let top: Vec<&Photo> = search.photos.iter().take(5).collect();
        top.choose(&mut rand::rng())
            .map(|photo| photo.src.large2x.clone())
            .ok_or_else(|| PipelineError::ApiError(format!("Pexels has no photo for '{}'", query)))
    }

    async fn search_clip(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/videos/search", self.base_url))
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("per_page", "15"),
                ("orientation", "portrait"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(PipelineError::ApiError(format!(
                "Pexels video search error: {}",
                error_text
            )));
        }

        let search: VideoSearch = response.json().await?;
        let candidates: Vec<String> = search
            .videos
            .iter()
            .take(5)
            .filter_map(best_rendition)
            .collect();
        candidates
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| PipelineError::ApiError(format!("Pexels has no clip for '{}'", query)))
    }
}

/// The MP4 rendition whose width is nearest to [`TARGET_CLIP_WIDTH`].
fn best_rendition(video: &Video) -> Option<String> {
    video
        .video_files
        .iter()
        .filter(|f| f.file_type.as_deref() == Some("video/mp4"))
        .min_by_key(|f| (f.width.unwrap_or(0) - TARGET_CLIP_WIDTH).abs())
        .map(|f| f.link.clone())
}

#[async_trait]
impl VisualSource for PexelsClient {
    fn name(&self) -> &'static str {
        "pexels"
    }

    async fn fetch(&self, kind: VisualKind, query: &str, dest: &Path) -> Result<()> {
        let url = match kind {
            VisualKind::Image => self.search_photo(query).await?,
            VisualKind::Clip => self.search_clip(query).await?,
        };
        let bytes = download_to(&self.client, &url, dest).await?;
        info!("Pexels {} for '{}' saved to {} ({} bytes)", kind, query, dest.display(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn rendition_closest_to_720_wins() {
        let video = Video {
            video_files: vec![
                VideoFile { link: "hd".into(), file_type: Some("video/mp4".into()), width: Some(1080) },
                VideoFile { link: "sd".into(), file_type: Some("video/mp4".into()), width: Some(640) },
                VideoFile { link: "webm".into(), file_type: Some("video/webm".into()), width: Some(720) },
            ],
        };
        assert_eq!(best_rendition(&video).as_deref(), Some("sd"));
    }

    #[tokio::test]
    async fn fetches_photo_for_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(header("authorization", "key"))
            .and(query_param("query", "bank vault door"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "photos": [{"src": {"large2x": format!("{}/files/vault.jpg", server.uri())}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/vault.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("beat_01_source.jpg");
        let client = PexelsClient::new("key".into()).unwrap().with_base_url(server.uri());
        client.fetch(VisualKind::Image, "bank vault door", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn empty_search_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"videos": []})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("beat_02_source.mp4");
        let client = PexelsClient::new("key".into()).unwrap().with_base_url(server.uri());
        assert!(client.fetch(VisualKind::Clip, "harbor night", &dest).await.is_err());
        assert!(!dest.exists());
    }
}
