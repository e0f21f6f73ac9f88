use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use tracing::{info, warn};

use super::captions::{pick_highlight, CaptionStyle, WordTiming};
use super::ffmpeg::{probe_duration, run_ffmpeg};
use super::timing::{allocate_frames, frames_for, within_tolerance};
use crate::api::Voiceover;
use crate::config::RenderConfig;
use crate::error::{PipelineError, Result};
use crate::script::{CameraMotion, Pace, Script, VideoFormat};
use crate::visual::{beat_number_from_file_name, ResolvedBeat, VisualKind};

const GRADE: &str = "eq=contrast=1.15:brightness=-0.05:saturation=0.85,curves=preset=darker,vignette=PI/4";
const HOOK_SECONDS: f64 = 1.8;
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "ogg"];
const FONT_EXTENSIONS: &[&str] = &["ttf", "otf"];

/// The finished video and the durations it was checked against.
#[derive(Debug, Clone)]
pub struct RenderedOutput {
    pub path: PathBuf,
    pub duration: f64,
    pub voiceover_duration: f64,
    pub highlight: String,
    pub music: Option<PathBuf>,
}

/// Cross-fade from one segment into the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub name: &'static str,
    pub frames: u32,
}

impl Transition {
    /// Snappy wipes for fast beats, slides for medium, slow fades for slow.
    fn for_pace(pace: Pace, beat_number: u32, fps: u32) -> Self {
        let (names, seconds): (&[&'static str], f64) = match pace {
            Pace::Fast => (&["fade", "fadeblack", "wipeleft", "wiperight"], 0.12),
            Pace::Medium => (&["slideleft", "slideright", "wipeleft", "wiperight"], 0.18),
            Pace::Slow => (&["fade", "fadeblack"], 0.25),
        };
        Transition {
            name: names[beat_number as usize % names.len()],
            frames: frames_for(seconds, fps),
        }
    }
}

/// One beat's slot on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub beat_number: u32,
    pub kind: VisualKind,
    pub source: PathBuf,
    /// Frames this beat owns on the final timeline.
    pub frames: u32,
    pub motion: CameraMotion,
    /// Transition into the next segment; `None` on the last one.
    pub transition: Option<Transition>,
}

impl Segment {
    /// Frames to render: the owned frames plus the overlap eaten by the outgoing transition.
    pub fn render_frames(&self) -> u32 {
        self.frames + self.transition.map(|t| t.frames).unwrap_or(0)
    }
}

/// Renders resolved beats, a voiceover and a script into one graded, captioned video.
pub struct Assembler {
    render: RenderConfig,
    temp_dir: PathBuf,
    music_dir: PathBuf,
    fonts_dir: PathBuf,
}

impl Assembler {
    pub fn new(render: RenderConfig, temp_dir: PathBuf, music_dir: PathBuf, fonts_dir: PathBuf) -> Self {
        Self {
            render,
            temp_dir,
            music_dir,
            fonts_dir,
        }
    }

    /// Lays the beats out in order and gives each its share of the voiceover.
    ///
    /// The list is taken as is: beats must already be in ascending beat order
    /// and every asset must belong to its beat with the parity-correct kind.
    pub fn plan(&self, beats: &[ResolvedBeat], voiceover_seconds: f64) -> Result<Vec<Segment>> {
        if beats.is_empty() {
            return Err(PipelineError::AssemblyError("no beats to assemble".to_string()));
        }
        for pair in beats.windows(2) {
            if pair[0].beat.beat_number >= pair[1].beat.beat_number {
                return Err(PipelineError::AssemblyError(format!(
                    "beats out of order: {} before {}",
                    pair[0].beat.beat_number, pair[1].beat.beat_number
                )));
            }
        }
        for resolved in beats {
            let number = resolved.beat.beat_number;
            if resolved.asset.beat_number != number {
                return Err(PipelineError::AssemblyError(format!(
                    "beat {} carries the asset of beat {}",
                    number, resolved.asset.beat_number
                )));
            }
            let named = resolved
                .asset
                .path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(beat_number_from_file_name);
            if named != Some(number) {
                return Err(PipelineError::AssemblyError(format!(
                    "beat {} points at {}, whose name does not carry that beat number",
                    number,
                    resolved.asset.path.display()
                )));
            }
            if resolved.asset.kind != VisualKind::for_beat(number) {
                return Err(PipelineError::AssemblyError(format!(
                    "beat {} must be a {}, got a {}",
                    number,
                    VisualKind::for_beat(number),
                    resolved.asset.kind
                )));
            }
        }

        let weights: Vec<f64> = beats.iter().map(|r| r.beat.pace.weight()).collect();
        let frames = allocate_frames(&weights, voiceover_seconds, self.render.fps);
        if frames.iter().any(|f| *f == 0) {
            return Err(PipelineError::AssemblyError(format!(
                "voiceover of {:.2}s is too short for {} beats",
                voiceover_seconds,
                beats.len()
            )));
        }

        let fps = self.render.fps;
        Ok(beats
            .iter()
            .enumerate()
            .map(|(i, resolved)| {
                let number = resolved.beat.beat_number;
                // Never let a cross-fade take more than half of either side.
                let transition = frames.get(i + 1).and_then(|next| {
                    let mut t = Transition::for_pace(resolved.beat.pace, number, fps);
                    t.frames = t.frames.min(frames[i] / 2).min(next / 2);
                    (t.frames > 0).then_some(t)
                });
                Segment {
                    beat_number: number,
                    kind: resolved.asset.kind,
                    source: resolved.asset.path.clone(),
                    frames: frames[i],
                    motion: resolved.beat.camera_motion.resolve(number),
                    transition,
                }
            })
            .collect())
    }

    /// Filter chaining the rendered segments (inputs `0..n`) into `[joined]`.
    ///
    /// Each segment was rendered `transition.frames` longer than it owns, and each
    /// cross-fade starts exactly where the segment's owned frames end, so the
    /// joined stream is as long as the planned timeline.
    pub fn join_graph(&self, segments: &[Segment]) -> String {
        let fps = self.render.fps as f64;
        let mut links = Vec::new();
        let mut previous = "[0:v]".to_string();
        let mut owned = 0u32;
        for (i, segment) in segments.iter().enumerate().take(segments.len().saturating_sub(1)) {
            owned += segment.frames;
            let label = if i + 2 == segments.len() {
                "[joined]".to_string()
            } else {
                format!("[x{}]", i + 1)
            };
            let link = match segment.transition {
                Some(t) => format!(
                    "{}[{}:v]xfade=transition={}:duration={:.3}:offset={:.3}{}",
                    previous,
                    i + 1,
                    t.name,
                    t.frames as f64 / fps,
                    owned as f64 / fps,
                    label
                ),
                None => format!("{}[{}:v]concat=n=2:v=1:a=0{}", previous, i + 1, label),
            };
            links.push(link);
            previous = label;
        }
        if links.is_empty() {
            return "[0:v]null[joined]".to_string();
        }
        links.join(";\n")
    }

    fn zoompan(&self, motion: CameraMotion, frames: u32) -> String {
        let (w, h, fps) = (self.render.width, self.render.height, self.render.fps);
        let centre = "x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)'";
        match motion {
            CameraMotion::ZoomOut => format!(
                "zoompan=z='if(lte(zoom,1.0),1.3,max(1.0,zoom-0.002))':{}:d={}:s={}x{}:fps={}",
                centre, frames, w, h, fps
            ),
            CameraMotion::PanRight => format!(
                "zoompan=z=1.2:x='iw/2-(iw/zoom/2)+20*on/{}':y='ih/2-(ih/zoom/2)':d={}:s={}x{}:fps={}",
                frames, frames, w, h, fps
            ),
            CameraMotion::PanLeft => format!(
                "zoompan=z=1.2:x='iw/2-(iw/zoom/2)-20*on/{}':y='ih/2-(ih/zoom/2)':d={}:s={}x{}:fps={}",
                frames, frames, w, h, fps
            ),
            CameraMotion::Shake => format!(
                "zoompan=z='min(zoom+0.003,1.4)':x='iw/2-(iw/zoom/2)+3*sin(on/2)':y='ih/2-(ih/zoom/2)+3*cos(on/2)':d={}:s={}x{}:fps={}",
                frames, w, h, fps
            ),
            CameraMotion::ZoomIn | CameraMotion::Auto => format!(
                "zoompan=z='min(zoom+0.002,1.3)':{}:d={}:s={}x{}:fps={}",
                centre, frames, w, h, fps
            ),
        }
    }

    /// FFmpeg arguments rendering one segment to exactly `segment.render_frames()` frames.
    pub fn segment_args(&self, segment: &Segment, output: &Path) -> Vec<String> {
        let (w, h, fps) = (self.render.width, self.render.height, self.render.fps);
        let mut args: Vec<String> = Vec::new();
        let filter = match segment.kind {
            VisualKind::Image => {
                args.extend(["-loop".into(), "1".into()]);
                // Oversample before zoompan so the motion has room to move.
                format!(
                    "scale={sw}:{sh}:force_original_aspect_ratio=increase,crop={sw}:{sh},{zoom},fps={fps},setsar=1",
                    sw = w * 4 / 3,
                    sh = h * 4 / 3,
                    zoom = self.zoompan(segment.motion, segment.render_frames()),
                    fps = fps
                )
            }
            VisualKind::Clip => {
                args.extend(["-stream_loop".into(), "-1".into()]);
                format!(
                    "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},fps={fps},setsar=1",
                    w = w,
                    h = h,
                    fps = fps
                )
            }
        };
        args.extend([
            "-i".into(),
            segment.source.to_string_lossy().into_owned(),
            "-vf".into(),
            filter,
            "-frames:v".into(),
            segment.render_frames().to_string(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            self.render.preset.clone(),
            "-crf".into(),
            "20".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-an".into(),
            output.to_string_lossy().into_owned(),
        ]);
        args
    }

    /// The single finishing graph: grade, captions, hook, then voice and music.
    ///
    /// Input 0 is the joined picture, 1 the voiceover, 2 the music when present.
    pub fn finishing_graph(
        &self,
        words: &[WordTiming],
        hook_text: &str,
        style: &CaptionStyle,
        duration: f64,
        with_music: bool,
    ) -> String {
        let mut video_chain = vec![GRADE.to_string()];
        video_chain.extend(style.caption_filters(words));
        video_chain.extend(style.hook_filter(hook_text, HOOK_SECONDS));
        video_chain.push(format!("trim=duration={:.3}", duration));
        video_chain.push("setpts=PTS-STARTPTS".to_string());

        let mut graph = format!("[0:v]{}[v];\n", video_chain.join(",\n"));
        if with_music {
            graph.push_str(&format!("[1:a]volume={}[voice];\n", self.render.voice_volume));
            graph.push_str(&format!(
                "[2:a]volume={},atrim=duration={:.3},asetpts=PTS-STARTPTS[music];\n",
                self.render.music_volume, duration
            ));
            graph.push_str("[voice][music]amix=inputs=2:duration=first:normalize=0[audio]");
        } else {
            graph.push_str(&format!("[1:a]volume={}[audio]", self.render.voice_volume));
        }
        graph
    }

    /// A random track from `music/<mood>/`, else from `music/` itself.
    pub fn pick_music(&self, mood: &str) -> Option<PathBuf> {
        let candidates = |dir: &Path| -> Vec<PathBuf> {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok().map(|e| e.path()))
                        .filter(|p| has_extension(p, AUDIO_EXTENSIONS))
                        .collect()
                })
                .unwrap_or_default()
        };
        let mut tracks = candidates(&self.music_dir.join(mood));
        if tracks.is_empty() {
            tracks = candidates(&self.music_dir);
        }
        tracks.choose(&mut rand::rng()).cloned()
    }

    fn caption_font(&self) -> Option<PathBuf> {
        if let Some(font) = self.render.font_file.as_ref().filter(|f| f.exists()) {
            return Some(font.clone());
        }
        let mut fonts: Vec<PathBuf> = std::fs::read_dir(&self.fonts_dir)
            .ok()?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| has_extension(p, FONT_EXTENSIONS))
            .collect();
        fonts.sort();
        fonts.into_iter().next()
    }

    pub async fn assemble(
        &self,
        beats: &[ResolvedBeat],
        voiceover: &Voiceover,
        script: &Script,
        output: &Path,
    ) -> Result<RenderedOutput> {
        info!("Starting video assembly for {} beats", beats.len());
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let voice_seconds = probe_duration(&voiceover.path).await?;
        let segments = self.plan(beats, voice_seconds)?;
        info!("Voiceover {:.2}s across {} segments", voice_seconds, segments.len());

        let mut rendered_segments = Vec::new();
        for segment in &segments {
            let path = self.temp_dir.join(format!("segment_{:02}.mp4", segment.beat_number));
            run_ffmpeg(
                &self.segment_args(segment, &path),
                &format!(
                    "Beat {} {} ({} frames)",
                    segment.beat_number,
                    segment.kind,
                    segment.render_frames()
                ),
            )
            .await?;
            rendered_segments.push(path);
        }

        let join_path = self.temp_dir.join("join.filter");
        let joined = self.temp_dir.join("joined.mp4");
        tokio::fs::write(&join_path, self.join_graph(&segments)).await?;
        let mut join_args = Vec::new();
        for path in &rendered_segments {
            join_args.extend(["-i".to_string(), path.to_string_lossy().into_owned()]);
        }
        join_args.extend(["-filter_complex_script".to_string(), join_path.to_string_lossy().into_owned()]);
        join_args.extend(strings(&["-map", "[joined]", "-c:v", "libx264", "-preset"]));
        join_args.push(self.render.preset.clone());
        join_args.extend(strings(&["-crf", "20", "-pix_fmt", "yuv420p", "-an"]));
        join_args.push(joined.to_string_lossy().into_owned());
        run_ffmpeg(&join_args, "Joining segments with transitions").await?;

        let mood = VideoFormat::from_key(&script.format)
            .map(|f| f.music_mood())
            .unwrap_or("cinematic");
        let music = self.pick_music(mood);
        match &music {
            Some(track) => info!("Music: {}", track.display()),
            None => warn!("No music found under {}; rendering voice only", self.music_dir.display()),
        }

        let highlight = pick_highlight();
        let style = CaptionStyle::new(
            self.render.width,
            self.render.height,
            self.caption_font(),
            highlight,
        )?;
        let graph = self.finishing_graph(
            &voiceover.words,
            &script.hook_text,
            &style,
            voice_seconds,
            music.is_some(),
        );
        let graph_path = self.temp_dir.join("finish.filter");
        tokio::fs::write(&graph_path, &graph).await?;

        let mut args = vec![
            "-i".to_string(),
            joined.to_string_lossy().into_owned(),
            "-i".to_string(),
            voiceover.path.to_string_lossy().into_owned(),
        ];
        if let Some(track) = &music {
            args.extend(strings(&["-stream_loop", "-1", "-i"]));
            args.push(track.to_string_lossy().into_owned());
        }
        args.extend(["-filter_complex_script".to_string(), graph_path.to_string_lossy().into_owned()]);
        args.extend(strings(&["-map", "[v]", "-map", "[audio]", "-c:v", "libx264", "-preset"]));
        args.push(self.render.preset.clone());
        args.extend(["-crf".to_string(), self.render.crf.to_string()]);
        args.extend(strings(&["-pix_fmt", "yuv420p", "-c:a", "aac", "-b:a", "192k", "-t"]));
        args.push(format!("{:.3}", voice_seconds));
        args.push(output.to_string_lossy().into_owned());
        run_ffmpeg(&args, "Final grade, captions and mix").await?;

        let duration = probe_duration(output).await?;
        if !within_tolerance(duration, voice_seconds, self.render.duration_tolerance) {
            return Err(PipelineError::AssemblyError(format!(
                "render is {:.2}s but voiceover is {:.2}s (tolerance {:.1}s)",
                duration, voice_seconds, self.render.duration_tolerance
            )));
        }

        for path in rendered_segments.iter().chain([&joined, &join_path]) {
            tokio::fs::remove_file(path).await.ok();
        }

        info!(
            "Video generation completed: {} ({:.2}s, voiceover {:.2}s)",
            output.display(),
            duration,
            voice_seconds
        );
        Ok(RenderedOutput {
            path: output.to_path_buf(),
            duration,
            voiceover_duration: voice_seconds,
            highlight: highlight.to_string(),
            music,
        })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
