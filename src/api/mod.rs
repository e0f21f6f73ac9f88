mod elevenlabs;
mod groq;
mod pexels;
mod pixabay;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::error::{PipelineError, Result};
use crate::script::Script;
use crate::video::WordTiming;
use crate::visual::VisualKind;

pub use elevenlabs::ElevenLabsClient;
pub use groq::GroqClient;
pub use pexels::PexelsClient;
pub use pixabay::PixabayClient;

/// A chat model that answers one prompt with one message.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// A stock-media provider able to find and download a still image or a clip.
#[async_trait]
pub trait VisualSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Searches for `query` and writes the chosen asset to `dest`.
    async fn fetch(&self, kind: VisualKind, query: &str, dest: &Path) -> Result<()>;
}

/// Narration audio on disk plus the time span of every spoken word.
#[derive(Debug, Clone)]
pub struct Voiceover {
    pub path: PathBuf,
    pub words: Vec<WordTiming>,
}

#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    async fn synthesize(&self, script: &Script, output_path: &Path) -> Result<Voiceover>;
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Streams `url` into `dest`, returning the number of bytes written.
pub(crate) async fn download_to(client: &Client, url: &str, dest: &Path) -> Result<u64> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(PipelineError::ApiError(format!(
            "Download of {} failed with HTTP {}",
            url,
            response.status()
        )));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        tokio::fs::remove_file(dest).await.ok();
        return Err(PipelineError::ApiError(format!("Download of {} was empty", url)));
    }
    Ok(written)
}
