use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{http_client, ChatCompletion};
use crate::error::{PipelineError, Result};

const GROQ_CHAT_API: &str = "https://api.groq.com/openai/v1/chat/completions";
/// A rate-limited key sits out this long before it is tried again.
const KEY_COOLDOWN: Duration = Duration::from_secs(25 * 60);
const MAX_TOKENS: u32 = 4096;

/// Groq chat-completions client rotating over a small pool of API keys.
#[derive(Debug)]
pub struct GroqClient {
    client: Client,
    keys: Vec<String>,
    model: String,
    endpoint: String,
    benched: Mutex<HashMap<usize, Instant>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

impl GroqClient {
    pub fn new(keys: Vec<String>, model: impl Into<String>) -> Result<Self> {
        if keys.is_empty() {
            return Err(PipelineError::EnvError(
                "GROQ_API_KEY not found. Set GROQ_API_KEY (and optionally GROQ_API_KEY_2/_3)".to_string(),
            ));
        }
        Ok(Self {
            client: http_client(Duration::from_secs(120))?,
            keys,
            model: model.into(),
            endpoint: GROQ_CHAT_API.to_string(),
            benched: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn available_keys(&self) -> Vec<usize> {
        let benched = self.benched.lock().unwrap_or_else(|e| e.into_inner());
        (0..self.keys.len())
            .filter(|idx| match benched.get(idx) {
                Some(at) => at.elapsed() > KEY_COOLDOWN,
                None => true,
            })
            .collect()
    }

    fn bench(&self, idx: usize) {
        let mut benched = self.benched.lock().unwrap_or_else(|e| e.into_inner());
        benched.insert(idx, Instant::now());
    }

    fn time_until_recovery(&self) -> Duration {
        let benched = self.benched.lock().unwrap_or_else(|e| e.into_inner());
        benched
            .values()
            .map(|at| KEY_COOLDOWN.saturating_sub(at.elapsed()))
            .min()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatCompletion for GroqClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let mut candidates = self.available_keys();
        if candidates.is_empty() {
            let wait = self.time_until_recovery() + Duration::from_secs(5);
            warn!("All Groq keys rate limited, waiting {}s", wait.as_secs());
            tokio::time::sleep(wait).await;
            candidates = (0..self.keys.len()).collect();
        }

        let request_body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": temperature,
            "max_tokens": MAX_TOKENS
        });

        for idx in candidates {
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.keys[idx])
                .json(&request_body)
                .send()
                .await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                warn!("Groq key {} rate limited, rotating to next key", idx + 1);
                self.bench(idx);
                continue;
            }

            if !response.status().is_success() {
                let error_text = response.text().await?;
                return Err(PipelineError::ApiError(format!(
                    "Groq API error: {}",
                    error_text
                )));
            }

            let parsed: ChatResponse = response.json().await?;
            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| PipelineError::ApiError("Groq returned no message".to_string()))?;

            info!("Groq key {} answered ({} chars)", idx + 1, content.len());
            return Ok(content.trim().to_string());
        }

        Err(PipelineError::ApiError(
            "All Groq keys are rate limited".to_string(),
        ))
    }
}
