use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use rand::seq::IndexedRandom;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{http_client, SpeechSynthesis, Voiceover};
use crate::error::{PipelineError, Result};
use crate::script::{Script, VideoFormat};
use crate::video::words_from_alignment;

const ELEVENLABS_API: &str = "https://api.elevenlabs.io";
const SIMILARITY_BOOST: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub stability: f32,
    pub style: f32,
}

const fn voice(id: &'static str, name: &'static str, stability: f32, style: f32) -> VoiceProfile {
    VoiceProfile {
        id,
        name,
        stability,
        style,
    }
}

const DEEP_MALE: &[VoiceProfile] = &[
    voice("knrPHWnBmmDHMoiMeP3l", "Liam", 0.40, 0.45),
    voice("TxGEqnHWrfWFTfGW9XjX", "Josh", 0.38, 0.50),
    voice("ErXwobaYiN019PkySvjV", "Antoni", 0.42, 0.40),
];

const WHISPERY_MALE: &[VoiceProfile] = &[
    voice("N2lVS1w4EtoT3dr4eOWO", "Callum", 0.50, 0.30),
    voice("SOYHLrjzK2X1ezoPC6cr", "Harry", 0.48, 0.28),
    voice("yoZ06aMxZJJ28mfd3POQ", "Sam", 0.52, 0.32),
];

const CALM_FEMALE: &[VoiceProfile] = &[
    voice("EXAVITQu4vr4xnSDxMaL", "Bella", 0.45, 0.40),
    voice("21m00Tcm4TlvDq8ikWAM", "Rachel", 0.50, 0.35),
    voice("MF3mGyEYCl7XYWbV9V6O", "Emily", 0.47, 0.38),
];

const ENERGETIC_MALE: &[VoiceProfile] = &[voice("nPczCjzI2devNBz1zQrb", "Brian", 0.30, 0.55)];

/// Voices for a voice type, falling back to the deep male pool.
pub fn voice_pool(voice_type: &str) -> &'static [VoiceProfile] {
    match voice_type {
        "whispery_male" => WHISPERY_MALE,
        "calm_female" => CALM_FEMALE,
        "energetic_male" => ENERGETIC_MALE,
        _ => DEEP_MALE,
    }
}

/// Picks a voice other than the one used last time for this voice type.
fn pick_voice(pool: &'static [VoiceProfile], last_used: Option<&str>) -> VoiceProfile {
    let fresh: Vec<&VoiceProfile> = pool
        .iter()
        .filter(|v| Some(v.name) != last_used)
        .collect();
    let choice = if fresh.is_empty() {
        pool.choose(&mut rand::rng())
    } else {
        fresh.choose(&mut rand::rng()).copied()
    };
    choice.copied().unwrap_or(DEEP_MALE[0])
}

#[derive(Debug, Deserialize)]
struct TimestampedSpeech {
    audio_base64: String,
    alignment: Option<Alignment>,
}

#[derive(Debug, Deserialize)]
struct Alignment {
    characters: Vec<String>,
    character_start_times_seconds: Vec<f64>,
    character_end_times_seconds: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    client: Client,
    keys: Vec<String>,
    model_id: String,
    base_url: String,
    history_path: PathBuf,
}

impl ElevenLabsClient {
    pub fn new(keys: Vec<String>, model_id: impl Into<String>, history_path: PathBuf) -> Result<Self> {
        if keys.is_empty() {
            return Err(PipelineError::EnvError(
                "ELEVENLABS_API_KEY not found. Set ELEVENLABS_API_KEY (and optionally _2/_3)".to_string(),
            ));
        }
        Ok(Self {
            client: http_client(Duration::from_secs(180))?,
            keys,
            model_id: model_id.into(),
            base_url: ELEVENLABS_API.to_string(),
            history_path,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn load_history(&self) -> HashMap<String, String> {
        std::fs::read_to_string(&self.history_path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn save_history(&self, history: &HashMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(history)?;
        std::fs::write(&self.history_path, content)?;
        Ok(())
    }

    fn resolve_voice_type(script: &Script) -> String {
        let known = ["deep_male", "whispery_male", "calm_female", "energetic_male"];
        if known.contains(&script.voice_type.as_str()) {
            return script.voice_type.clone();
        }
        VideoFormat::from_key(&script.format)
            .map(|f| f.voice_type())
            .unwrap_or("deep_male")
            .to_string()
    }
}

#[async_trait]
impl SpeechSynthesis for ElevenLabsClient {
    async fn synthesize(&self, script: &Script, output_path: &Path) -> Result<Voiceover> {
        let text = script.script.trim();
        if text.is_empty() {
            return Err(PipelineError::GenerationError(
                "Script has no narration text".to_string(),
            ));
        }

        let voice_type = Self::resolve_voice_type(script);
        let mut history = self.load_history();
        let chosen = pick_voice(voice_pool(&voice_type), history.get(&voice_type).map(String::as_str));
        history.insert(voice_type.clone(), chosen.name.to_string());
        if let Err(e) = self.save_history(&history) {
            warn!("Could not persist voice history: {}", e);
        }

        info!(
            "Generating voiceover: {} words, voice {} ({})",
            text.split_whitespace().count(),
            chosen.name,
            voice_type
        );

        let request_body = json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": chosen.stability,
                "similarity_boost": SIMILARITY_BOOST,
                "style": chosen.style,
                "use_speaker_boost": true
            }
        });
        let url = format!(
            "{}/v1/text-to-speech/{}/with-timestamps",
            self.base_url, chosen.id
        );

        for (idx, key) in self.keys.iter().enumerate() {
            let response = self
                .client
                .post(&url)
                .header("xi-api-key", key)
                .json(&request_body)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::UNAUTHORIZED {
                let error_text = response.text().await?;
                if status == StatusCode::TOO_MANY_REQUESTS || error_text.contains("quota_exceeded") {
                    warn!("ElevenLabs key {} exhausted, rotating", idx + 1);
                    continue;
                }
                return Err(PipelineError::ApiError(format!(
                    "ElevenLabs error {}: {}",
                    status, error_text
                )));
            }
            if !status.is_success() {
                let error_text = response.text().await?;
                return Err(PipelineError::ApiError(format!(
                    "ElevenLabs error {}: {}",
                    status, error_text
                )));
            }

            let speech: TimestampedSpeech = response.json().await?;
            let audio = base64::engine::general_purpose::STANDARD.decode(speech.audio_base64.as_bytes())?;
            if let Some(parent) = output_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(output_path, &audio).await?;

            let words = match speech.alignment {
                Some(a) => words_from_alignment(
                    &a.characters,
                    &a.character_start_times_seconds,
                    &a.character_end_times_seconds,
                ),
                None => {
                    warn!("ElevenLabs returned no alignment; captions will be empty");
                    Vec::new()
                }
            };

            info!(
                "Speech saved to: {} ({} KB, {} timed words)",
                output_path.display(),
                audio.len() / 1024,
                words.len()
            );
            return Ok(Voiceover {
                path: output_path.to_path_buf(),
                words,
            });
        }

        Err(PipelineError::ApiError(
            "All ElevenLabs keys exhausted".to_string(),
        ))
    }
}
