use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_TTS_MODEL: &str = "eleven_multilingual_v2";

/// Process-wide configuration, resolved once at startup and passed explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory the pipeline reads and writes in (images/, clips/, output/ ...).
    pub work_dir: PathBuf,
    /// Persistent volume holding state that must survive redeploys.
    pub data_dir: Option<PathBuf>,
    pub port: u16,
    pub groq_keys: Vec<String>,
    pub groq_model: String,
    pub elevenlabs_keys: Vec<String>,
    pub tts_model: String,
    pub pexels_key: Option<String>,
    pub pixabay_key: Option<String>,
    /// Upper bound on concurrent provider lookups during visual resolution.
    pub resolve_concurrency: usize,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub crf: u8,
    pub preset: String,
    pub voice_volume: f32,
    pub music_volume: f32,
    /// Maximum allowed gap between the render and the voiceover, in seconds.
    pub duration_tolerance: f64,
    pub font_file: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            width: 1080,
            height: 1920,
            fps: 30,
            crf: 22,
            preset: "fast".to_string(),
            voice_volume: 1.0,
            music_volume: 0.08,
            duration_tolerance: 0.5,
            font_file: None,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 || self.width == 0 || self.height == 0 {
            return Err(PipelineError::ConfigError(
                "render size and fps must be non-zero".to_string(),
            ));
        }
        if self.music_volume < 0.0 || self.music_volume >= self.voice_volume {
            return Err(PipelineError::ConfigError(format!(
                "music volume {} must be below voice volume {}",
                self.music_volume, self.voice_volume
            )));
        }
        if self.duration_tolerance <= 0.0 {
            return Err(PipelineError::ConfigError(
                "duration tolerance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| PipelineError::EnvError(format!("PORT is not a valid port: {}", raw)))?,
            None => DEFAULT_PORT,
        };

        let resolve_concurrency = match get("RESOLVE_CONCURRENCY") {
            Some(raw) => raw.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                PipelineError::EnvError(format!("RESOLVE_CONCURRENCY must be a positive integer: {}", raw))
            })?,
            None => 2,
        };

        let mut render = RenderConfig::default();
        if let Some(raw) = get("MUSIC_VOLUME") {
            render.music_volume = raw
                .parse::<f32>()
                .map_err(|_| PipelineError::EnvError(format!("MUSIC_VOLUME is not a number: {}", raw)))?;
        }
        render.font_file = get("CAPTION_FONT").map(PathBuf::from);
        render.validate()?;

        Ok(AppConfig {
            work_dir: get("WORK_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            data_dir: get("DATA_DIR").map(PathBuf::from),
            port,
            groq_keys: key_pool(&get, "GROQ_API_KEY"),
            groq_model: get("GROQ_MODEL").unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
            elevenlabs_keys: key_pool(&get, "ELEVENLABS_API_KEY"),
            tts_model: get("ELEVENLABS_MODEL").unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            pexels_key: get("PEXELS_API_KEY"),
            pixabay_key: get("PIXABAY_API_KEY"),
            resolve_concurrency,
            render,
        })
    }

    pub fn images_dir(&self) -> PathBuf {
        self.work_dir.join("images")
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.work_dir.join("clips")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.work_dir.join("audio")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.work_dir.join("output")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.work_dir.join("temp")
    }

    pub fn fonts_dir(&self) -> PathBuf {
        self.work_dir.join("fonts")
    }

    pub fn music_dir(&self) -> PathBuf {
        self.work_dir.join("music")
    }

    pub fn analytics_db(&self) -> PathBuf {
        self.work_dir.join("analytics.db")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.work_dir.join("settings.json")
    }

    pub fn voice_history_file(&self) -> PathBuf {
        self.work_dir.join("voice_history.json")
    }

    /// Every directory a run writes into.
    pub fn workspace_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.images_dir(),
            self.clips_dir(),
            self.audio_dir(),
            self.output_dir(),
            self.temp_dir(),
            self.fonts_dir(),
            self.music_dir(),
        ]
    }
}

/// `NAME`, `NAME_2`, `NAME_3`, skipping blanks.
fn key_pool<G>(get: &G, name: &str) -> Vec<String>
where
    G: Fn(&str) -> Option<String>,
{
    [name.to_string(), format!("{}_2", name), format!("{}_3", name)]
        .iter()
        .filter_map(|key| get(key))
        .collect()
}

/// Operator-editable settings stored next to the analytics database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_max_videos")]
    pub max_videos_per_day: u32,
}

fn default_max_videos() -> u32 {
    4
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        RuntimeSettings {
            max_videos_per_day: default_max_videos(),
        }
    }
}

impl RuntimeSettings {
    /// Missing file means defaults; a malformed file is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(RuntimeSettings::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            PipelineError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.work_dir, PathBuf::from("."));
        assert!(config.data_dir.is_none());
        assert!(config.groq_keys.is_empty());
        assert_eq!(config.render, RenderConfig::default());
    }

    #[test]
    fn key_pool_collects_numbered_keys_and_skips_blanks() {
        let config = config_from(&[
            ("GROQ_API_KEY", "first"),
            ("GROQ_API_KEY_2", "  "),
            ("GROQ_API_KEY_3", "third"),
        ])
        .unwrap();
        assert_eq!(config.groq_keys, vec!["first".to_string(), "third".to_string()]);
    }

    #[test]
    fn port_is_read_from_environment() {
        let config = config_from(&[("PORT", "8080")]).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config_from(&[("PORT", "not-a-port")]).is_err());
    }

    #[test]
    fn music_must_stay_below_voice() {
        assert!(config_from(&[("MUSIC_VOLUME", "0.2")]).is_ok());
        let err = config_from(&[("MUSIC_VOLUME", "1.5")]).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    #[test]
    fn runtime_settings_default_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RuntimeSettings::load_or_default(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings.max_videos_per_day, 4);
    }

    #[test]
    fn runtime_settings_read_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"max_videos_per_day": 2}"#).unwrap();
        let settings = RuntimeSettings::load_or_default(&path).unwrap();
        assert_eq!(settings.max_videos_per_day, 2);

        std::fs::write(&path, "{ nope").unwrap();
        assert!(RuntimeSettings::load_or_default(&path).is_err());
    }
}
