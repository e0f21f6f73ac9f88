use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use beatreel::api::{ChatCompletion, SpeechSynthesis, VisualSource, Voiceover};
use beatreel::script::{parse_script, Script};
use beatreel::video::{probe_duration, run_ffmpeg, WordTiming};
use beatreel::visual::VisualKind;
use beatreel::{AppConfig, Pipeline, PipelineError, Result, RunRequest};
use serde_json::json;

const BEATS: [(&str, &str, &str); 6] = [
    (
        "Marcus Hale found the bank vault open at dawn",
        "steel bank vault door hanging open, cold dawn light, empty marble lobby",
        "bank vault door",
    ),
    (
        "The night guard had logged nothing unusual",
        "tired night guard at a security desk, logbook open, dim monitors",
        "security guard desk",
    ),
    (
        "Every deposit box inside was still locked",
        "rows of brass deposit boxes, all locked, flashlight beam across them",
        "deposit boxes row",
    ),
    (
        "Only one ledger page was missing",
        "leather ledger on a desk with a torn page edge, close-up",
        "old ledger pages",
    ),
    (
        "The page listed a single account opened in 1971",
        "yellowed account page with a 1971 date stamp under a lamp",
        "typewriter document lamp",
    ),
    (
        "That account still receives a deposit every March",
        "bank statement showing a March deposit, fingers tracing the line",
        "bank statement deposit",
    ),
];

fn script_reply() -> String {
    let beats: Vec<serde_json::Value> = BEATS
        .iter()
        .enumerate()
        .rev()
        .map(|(i, (text, prompt, keywords))| {
            let pace = if i == 0 { "fast" } else { "medium" };
            json!({
                "beat_number": i + 1,
                "text": text,
                "image_prompt": prompt,
                "video_keywords": [keywords],
                "pace": pace,
                "camera_motion": "zoom_in"
            })
        })
        .collect();

    let spoken: Vec<&str> = BEATS.iter().map(|(text, _, _)| *text).collect();
    let mut narration = spoken.join(". ");
    while narration.split_whitespace().count() < 240 {
        narration.push_str(" Nobody at the branch could explain why the vault was open.");
    }

    let body = json!({
        "format": "scary_truth",
        "topic": "the open vault",
        "hook_line": spoken[0],
        "hook_text": "THE VAULT WAS ALREADY OPEN",
        "script": narration,
        "beats": beats,
        "suggested_music": "dark_ambient",
        "voice_type": "whispery_male"
    });
    format!("```json\n{}\n```", serde_json::to_string_pretty(&body).unwrap())
}

struct CannedModel;

#[async_trait]
impl ChatCompletion for CannedModel {
    async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String> {
        Ok(script_reply())
    }
}

/// Writes placeholder bytes and remembers every query it saw.
struct PlaceholderSource {
    queries: Mutex<Vec<(VisualKind, String)>>,
    fail: bool,
}

impl PlaceholderSource {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            queries: Mutex::new(Vec::new()),
            fail,
        })
    }
}

#[async_trait]
impl VisualSource for PlaceholderSource {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    async fn fetch(&self, kind: VisualKind, query: &str, dest: &Path) -> Result<()> {
        self.queries.lock().unwrap().push((kind, query.to_string()));
        if self.fail {
            return Err(PipelineError::ApiError("nothing found".to_string()));
        }
        tokio::fs::write(dest, format!("{} for {}", kind, query)).await?;
        Ok(())
    }
}

struct SilentSpeech;

#[async_trait]
impl SpeechSynthesis for SilentSpeech {
    async fn synthesize(&self, _script: &Script, output_path: &Path) -> Result<Voiceover> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output_path, b"ID3").await?;
        Ok(Voiceover {
            path: output_path.to_path_buf(),
            words: Vec::new(),
        })
    }
}

fn config_in(dir: &Path) -> AppConfig {
    let work_dir = dir.to_string_lossy().to_string();
    AppConfig::from_lookup(|key| (key == "WORK_DIR").then(|| work_dir.clone())).unwrap()
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn fenced_and_bare_replies_parse_to_the_same_script() {
    let fenced = script_reply();
    let bare = fenced
        .trim_start_matches("```json")
        .trim_end_matches("```")
        .trim()
        .to_string();
    assert_eq!(parse_script(&fenced).unwrap(), parse_script(&bare).unwrap());
}

#[tokio::test]
async fn produce_places_images_on_odd_beats_and_clips_on_even() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    // Leftovers from an earlier run must not survive.
    std::fs::create_dir_all(config.images_dir()).unwrap();
    std::fs::write(config.images_dir().join("beat_09_source.jpg"), b"old").unwrap();

    let source = PlaceholderSource::new(false);
    let pipeline = Pipeline::new(
        config.clone(),
        Arc::new(CannedModel),
        vec![source.clone() as Arc<dyn VisualSource>],
        Arc::new(SilentSpeech),
    );

    let production = pipeline
        .produce(&RunRequest {
            topic: Some("the open vault".to_string()),
            format: None,
        })
        .await
        .unwrap();

    assert_eq!(
        file_names(&config.images_dir()),
        vec!["beat_01_source.jpg", "beat_03_source.jpg", "beat_05_source.jpg"]
    );
    assert_eq!(
        file_names(&config.clips_dir()),
        vec!["beat_02_source.mp4", "beat_04_source.mp4", "beat_06_source.mp4"]
    );

    let numbers: Vec<u32> = production.beats.iter().map(|b| b.beat.beat_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    for resolved in &production.beats {
        assert_eq!(resolved.asset.kind, VisualKind::for_beat(resolved.beat.beat_number));
        assert!(resolved.asset.path.exists());
    }
    assert_eq!(production.beats[0].beat.text, BEATS[0].0);
    assert!(production.script_path.exists());
    assert!(production.voiceover.path.exists());

    let queries = source.queries.lock().unwrap();
    assert_eq!(queries.len(), 6);
    assert_eq!(
        queries.iter().filter(|(kind, _)| *kind == VisualKind::Image).count(),
        3
    );
}

#[tokio::test]
async fn produce_fails_when_no_provider_has_the_visual() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let pipeline = Pipeline::new(
        config.clone(),
        Arc::new(CannedModel),
        vec![PlaceholderSource::new(true) as Arc<dyn VisualSource>],
        Arc::new(SilentSpeech),
    );

    let err = pipeline
        .produce(&RunRequest {
            topic: Some("the open vault".to_string()),
            format: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ResolutionError { .. }));
    assert!(file_names(&config.images_dir()).is_empty());
}

/// Renders real media with ffmpeg's test sources.
struct LavfiSource;

#[async_trait]
impl VisualSource for LavfiSource {
    fn name(&self) -> &'static str {
        "lavfi"
    }

    async fn fetch(&self, kind: VisualKind, _query: &str, dest: &Path) -> Result<()> {
        let input = match kind {
            VisualKind::Image => "color=c=navy:s=1080x1920",
            VisualKind::Clip => "testsrc=size=1080x1920:rate=30:duration=3",
        };
        let mut args = vec!["-f".to_string(), "lavfi".to_string(), "-i".to_string(), input.to_string()];
        if kind == VisualKind::Image {
            args.extend(["-frames:v".to_string(), "1".to_string()]);
        }
        args.push(dest.to_string_lossy().to_string());
        run_ffmpeg(&args, "test asset").await
    }
}

struct ToneSpeech;

#[async_trait]
impl SpeechSynthesis for ToneSpeech {
    async fn synthesize(&self, _script: &Script, output_path: &Path) -> Result<Voiceover> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let args: Vec<String> = [
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=220:duration=12",
            "-c:a",
            "libmp3lame",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(output_path.to_string_lossy().to_string()))
        .collect();
        run_ffmpeg(&args, "test voiceover").await?;

        let words = ["THE", "VAULT", "WAS", "OPEN", "AT", "DAWN"]
            .iter()
            .enumerate()
            .map(|(i, w)| WordTiming {
                word: w.to_string(),
                start: i as f64 * 0.5,
                end: i as f64 * 0.5 + 0.4,
            })
            .collect();
        Ok(Voiceover {
            path: PathBuf::from(output_path),
            words,
        })
    }
}

#[tokio::test]
#[ignore = "needs ffmpeg and ffprobe on PATH"]
async fn render_matches_voiceover_length() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let pipeline = Pipeline::new(
        config.clone(),
        Arc::new(CannedModel),
        vec![Arc::new(LavfiSource) as Arc<dyn VisualSource>],
        Arc::new(ToneSpeech),
    );

    let report = pipeline
        .run(&RunRequest {
            topic: Some("the open vault".to_string()),
            format: None,
        })
        .await
        .unwrap();

    let duration = probe_duration(&report.rendered.path).await.unwrap();
    assert!((duration - 12.0).abs() <= 0.5, "rendered {:.2}s", duration);
    assert!(report.rendered.path.starts_with(config.output_dir()));
}
