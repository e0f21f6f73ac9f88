use std::sync::Arc;

use tracing::{info, warn};

use crate::api::ChatCompletion;
use crate::error::{PipelineError, Result};

use super::{parse_script, Script, VideoFormat};

pub const MIN_SCRIPT_WORDS: usize = 230;
const MAX_ATTEMPTS: usize = 3;

const BEAT_EXAMPLE: &str = r#"{
  "beat_number": 1,
  "text": "I watched $420,000 disappear in four minutes",
  "image_prompt": "extreme close-up of a 38-year-old trader in a sweat-soaked white shirt, jaw locked, cold blue monitor glow on half his face, cascading red stock numbers reflected in his eyes, pitch black trading floor behind him, photorealistic, dark cinematic, vertical 9:16",
  "video_keywords": ["stock market crash screen", "trader panic desk"],
  "pace": "fast",
  "camera_motion": "zoom_in"
}"#;

const BEAT_RULES: &str = "BEAT FIELDS:
- beat_number: 1, 2, 3 ... in speaking order
- text: the exact words spoken during this beat
- pace: \"fast\" (2-4s) | \"medium\" (5-8s) | \"slow\" (8-12s)
- camera_motion: \"zoom_in\" | \"zoom_out\" | \"pan_right\" | \"pan_left\" | \"shake\"

IMAGE PROMPT RULES:
- It MUST name the concrete subject of the beat's text, reusing the nouns from the text.
- Exact subject (age, clothing), body language, specific setting, lighting, camera angle.
- Every beat shows a different scene. No generic backdrops.

VIDEO KEYWORDS RULES:
- 2-4 short search phrases describing what a camera physically sees in this beat.
- Reuse at least one noun from the beat's text.
- No person names, no company names, no abstract concepts.
- No two beats share the same keywords.";

/// Everything the writer needs to produce one script.
#[derive(Debug, Clone)]
pub struct ScriptRequest<'a> {
    pub topic: &'a str,
    pub format: VideoFormat,
    pub trend: Option<&'a str>,
    pub used_topics: &'a [String],
    pub used_hooks: &'a [String],
}

pub struct ScriptWriter {
    llm: Arc<dyn ChatCompletion>,
}

impl ScriptWriter {
    pub fn new(llm: Arc<dyn ChatCompletion>) -> Self {
        Self { llm }
    }

    /// One model call per attempt returns narration and visuals together.
    pub async fn write(&self, request: &ScriptRequest<'_>) -> Result<Script> {
        info!(
            "Writing {} script for topic: {}",
            request.format.display_name(),
            request.topic
        );
        let base_prompt = build_prompt(request);
        let mut feedback = String::new();
        let mut last: Option<Script> = None;

        for attempt in 0..MAX_ATTEMPTS {
            let prompt = format!("{}{}", base_prompt, feedback);
            let temperature = (0.85 + attempt as f32 * 0.08).min(1.0);
            let response = self.llm.complete(&prompt, temperature).await?;

            let mut script = parse_script(&response)?;
            script.topic = request.topic.to_string();
            script.format = request.format.key().to_string();
            if script.voice_type.is_empty() {
                script.voice_type = request.format.voice_type().to_string();
            }

            let words = script.word_count();
            let untraceable = script.untraceable_beats();
            if words >= MIN_SCRIPT_WORDS && untraceable.is_empty() {
                info!(
                    "Script OK: {} words, {} beats (attempt {})",
                    words,
                    script.beats.len(),
                    attempt + 1
                );
                return Ok(script);
            }

            warn!(
                "Attempt {}: {} words, untraceable beats {:?}",
                attempt + 1,
                words,
                untraceable
            );
            feedback = retry_feedback(words, &untraceable);
            last = Some(script);
        }

        let script = last.ok_or_else(|| {
            PipelineError::GenerationError("No script produced".to_string())
        })?;
        let untraceable = script.untraceable_beats();
        if !untraceable.is_empty() {
            return Err(PipelineError::GenerationError(format!(
                "Beats {:?} have visuals unrelated to their text after {} attempts",
                untraceable, MAX_ATTEMPTS
            )));
        }
        warn!(
            "Accepting short script after {} attempts ({} words)",
            MAX_ATTEMPTS,
            script.word_count()
        );
        Ok(script)
    }
}

fn retry_feedback(words: usize, untraceable: &[u32]) -> String {
    let mut feedback = String::from("\n\n--- RETRY INSTRUCTION ---\n");
    if words < MIN_SCRIPT_WORDS {
        feedback.push_str(&format!(
            "Your last script had only {} words. Write 250-280 words: more story depth, \
             specific details, exact amounts, names and tension.\n",
            words
        ));
    }
    if !untraceable.is_empty() {
        feedback.push_str(&format!(
            "Beats {:?} had image_prompt and video_keywords that never mention what their text \
             talks about. Every beat's visuals must reuse the concrete nouns of its own text.\n",
            untraceable
        ));
    }
    feedback
}

fn build_prompt(request: &ScriptRequest<'_>) -> String {
    let format = request.format;
    let (min_len, max_len) = format.length_range();

    let trend = request
        .trend
        .map(|t| format!("\nTRENDING RIGHT NOW: {}", t))
        .unwrap_or_default();

    let mut blacklist = String::new();
    if !request.used_topics.is_empty() {
        let topics: Vec<String> = request
            .used_topics
            .iter()
            .take(10)
            .map(|t| format!("  - {}", t))
            .collect();
        blacklist.push_str(&format!(
            "\nTOPICS ALREADY MADE (do not repeat or closely resemble):\n{}\n",
            topics.join("\n")
        ));
    }
    if !request.used_hooks.is_empty() {
        let hooks: Vec<String> = request
            .used_hooks
            .iter()
            .take(15)
            .map(|h| format!("  - {}", h))
            .collect();
        blacklist.push_str(&format!(
            "\nHOOKS ALREADY USED (hook_text must differ in structure and wording):\n{}\n",
            hooks.join("\n")
        ));
    }

    format!(
        r#"You are writing a script for a faceless YouTube Shorts and TikTok channel.

FORMAT: {name}
TOPIC: {topic}
TARGET LENGTH: {min_len}-{max_len} seconds. Write 250-280 words.
{trend}{blacklist}
STRUCTURE (follow exactly):
{structure}

WRITING RULES:
- Never open with "Imagine", "Picture this", "Have you ever" or "What if". Open on a real event.
- One specific story about one specific person: a name, an age, an amount.
- Short sentences. No filler. English only.

{rules}

REFERENCE BEAT:
{example}

Divide the script into 8-14 beats. The beats' text, read in order, is the whole script.

Return ONLY valid JSON, starting with {{ and ending with }}:
{{
    "format": "{key}",
    "topic": "{topic}",
    "hook_line": "the very first spoken line",
    "hook_text": "ALL CAPS MAX 8 WORDS",
    "script": "the full narration",
    "beats": [beat objects as in the reference],
    "suggested_music": "one of: cinematic tense dark_ambient phonk lofi",
    "voice_type": "{voice}"
}}"#,
        name = format.display_name(),
        topic = request.topic,
        min_len = min_len,
        max_len = max_len,
        trend = trend,
        blacklist = blacklist,
        structure = format.structure(),
        rules = BEAT_RULES,
        example = BEAT_EXAMPLE,
        key = format.key(),
        voice = format.voice_type(),
    )
}
