use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use crate::analytics::{Analytics, VideoRecord};
use crate::api::{
    ChatCompletion, ElevenLabsClient, GroqClient, PexelsClient, PixabayClient, SpeechSynthesis,
    VisualSource, Voiceover,
};
use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::script::{Script, ScriptRequest, ScriptWriter, VideoFormat};
use crate::topic::pick_fresh_topic;
use crate::video::{Assembler, RenderedOutput};
use crate::visual::{ResolvedBeat, VisualResolver};

/// How many past topics and hooks are kept out of new scripts.
const HISTORY_LIMIT: u32 = 50;

/// What to make. Empty means: pick a fresh seed topic.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub topic: Option<String>,
    pub format: Option<VideoFormat>,
}

/// Everything produced before rendering.
#[derive(Debug, Clone)]
pub struct Production {
    pub run_id: String,
    pub script: Script,
    pub script_path: PathBuf,
    pub beats: Vec<ResolvedBeat>,
    pub voiceover: Voiceover,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub topic: String,
    pub format: String,
    pub script_path: PathBuf,
    pub rendered: RenderedOutput,
}

pub struct Pipeline {
    config: AppConfig,
    writer: ScriptWriter,
    resolver: VisualResolver,
    speech: Arc<dyn SpeechSynthesis>,
    assembler: Assembler,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn ChatCompletion>,
        sources: Vec<Arc<dyn VisualSource>>,
        speech: Arc<dyn SpeechSynthesis>,
    ) -> Self {
        let resolver = VisualResolver::new(sources, config.images_dir(), config.clips_dir())
            .with_concurrency(config.resolve_concurrency);
        let assembler = Assembler::new(
            config.render.clone(),
            config.temp_dir(),
            config.music_dir(),
            config.fonts_dir(),
        );
        Self {
            writer: ScriptWriter::new(llm),
            resolver,
            speech,
            assembler,
            config,
        }
    }

    /// Wires the real Groq, Pexels, Pixabay and ElevenLabs clients.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let llm = GroqClient::new(config.groq_keys.clone(), config.groq_model.clone())?;

        let mut sources: Vec<Arc<dyn VisualSource>> = Vec::new();
        if let Some(key) = &config.pexels_key {
            sources.push(Arc::new(PexelsClient::new(key.clone())?));
        }
        if let Some(key) = &config.pixabay_key {
            sources.push(Arc::new(PixabayClient::new(key.clone())?));
        }
        if sources.is_empty() {
            return Err(PipelineError::EnvError(
                "No visual provider configured. Set PEXELS_API_KEY and/or PIXABAY_API_KEY".to_string(),
            ));
        }

        let speech = ElevenLabsClient::new(
            config.elevenlabs_keys.clone(),
            config.tts_model.clone(),
            config.voice_history_file(),
        )?;

        Ok(Self::new(config.clone(), Arc::new(llm), sources, Arc::new(speech)))
    }

    /// Creates every workspace directory and clears files left by earlier runs.
    pub fn prepare_workspace(&self) -> Result<usize> {
        for dir in self.config.workspace_dirs() {
            std::fs::create_dir_all(&dir)?;
        }
        let mut removed = 0;
        removed += clear_files(&self.config.images_dir(), Some(&["jpg", "jpeg", "png", "mp4"]))?;
        removed += clear_files(&self.config.clips_dir(), Some(&["mp4"]))?;
        removed += clear_files(&self.config.temp_dir(), None)?;
        if removed > 0 {
            info!("Cleaned {} stale files from the workspace", removed);
        }
        Ok(removed)
    }

    fn choose_topic(&self, request: &RunRequest, used_topics: &[String]) -> Result<(String, VideoFormat)> {
        match &request.topic {
            Some(topic) => {
                let format = request
                    .format
                    .unwrap_or_else(|| VideoFormat::infer_or_random(topic));
                Ok((topic.clone(), format))
            }
            None => pick_fresh_topic(used_topics).ok_or_else(|| {
                PipelineError::GenerationError("every seed topic has already been used".to_string())
            }),
        }
    }

    /// Script, visuals and voiceover: everything up to rendering.
    pub async fn produce(&self, request: &RunRequest) -> Result<Production> {
        self.prepare_workspace()?;
        let run_id = Local::now().format("%Y%m%d_%H%M%S").to_string();

        let (used_topics, used_hooks) = {
            let analytics = Analytics::open(&self.config.analytics_db())?;
            (
                analytics.used_topics(HISTORY_LIMIT)?,
                analytics.used_hooks(HISTORY_LIMIT)?,
            )
        };

        let (topic, format) = self.choose_topic(request, &used_topics)?;
        info!("Run {}: {} [{}]", run_id, topic, format.key());

        let script = self
            .writer
            .write(&ScriptRequest {
                topic: &topic,
                format,
                trend: None,
                used_topics: &used_topics,
                used_hooks: &used_hooks,
            })
            .await?;

        let script_path = self.config.temp_dir().join(format!("script_{}.json", run_id));
        tokio::fs::write(&script_path, serde_json::to_string_pretty(&script)?).await?;
        info!("Script saved to {}", script_path.display());

        let voice_path = self.config.audio_dir().join(format!("voiceover_{}.mp3", run_id));
        let (beats, voiceover) = tokio::try_join!(
            self.resolver.resolve(&script.beats),
            self.speech.synthesize(&script, &voice_path),
        )?;

        Ok(Production {
            run_id,
            script,
            script_path,
            beats,
            voiceover,
        })
    }

    pub async fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let production = self.produce(request).await?;
        let output = self
            .config
            .output_dir()
            .join(format!("{}.mp4", production.run_id));

        let rendered = self
            .assembler
            .assemble(&production.beats, &production.voiceover, &production.script, &output)
            .await?;

        let record = VideoRecord::rendered(
            &production.run_id,
            Local::now(),
            &production.script.topic,
            &production.script.format,
            &production.script.hook_text,
            &rendered.path,
            rendered.duration,
        );
        if let Err(e) = Analytics::open(&self.config.analytics_db()).and_then(|db| db.log_video(&record)) {
            warn!("Could not record run {}: {}", production.run_id, e);
        }

        info!(
            "Run {} rendered to {}. Watch it, then confirm with `beatreel approve {}`",
            production.run_id,
            rendered.path.display(),
            production.run_id
        );
        Ok(RunReport {
            run_id: production.run_id,
            topic: production.script.topic,
            format: production.script.format,
            script_path: production.script_path,
            rendered,
        })
    }
}

/// Removes regular files in `dir`, optionally only those with one of `extensions`.
fn clear_files(dir: &Path, extensions: Option<&[&str]>) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = match extensions {
            None => true,
            Some(allowed) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| allowed.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false),
        };
        if matches {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
