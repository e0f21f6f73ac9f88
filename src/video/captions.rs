use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fontdue::{Font, FontSettings};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// One spoken word with absolute start/end times in the voiceover, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Groups per-character alignment into words split on whitespace.
pub fn words_from_alignment(characters: &[String], starts: &[f64], ends: &[f64]) -> Vec<WordTiming> {
    let mut words = Vec::new();
    let mut current: Option<WordTiming> = None;

    for ((ch, start), end) in characters.iter().zip(starts).zip(ends) {
        if ch.trim().is_empty() {
            words.extend(current.take());
            continue;
        }
        match current.as_mut() {
            Some(word) => {
                word.word.push_str(ch);
                word.end = *end;
            }
            None => {
                current = Some(WordTiming {
                    word: ch.clone(),
                    start: *start,
                    end: *end,
                });
            }
        }
    }
    words.extend(current);
    words
}

pub const HIGHLIGHT_COLORS: &[&str] = &["#FFE600", "#FF3B30", "#00D4FF", "#FF6B00", "#00FF88", "#FF2D9B"];

/// One highlight colour per run.
pub fn pick_highlight() -> &'static str {
    HIGHLIGHT_COLORS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("#FFE600")
}

const CHUNK_WORDS: usize = 3;
/// Glyph advance guesses for when drawtext falls back to a fontconfig font.
const CHAR_WIDTH_RATIO: f32 = 0.6;
const SPACE_WIDTH_RATIO: f32 = 0.3;
/// Widest a caption line may be, as a share of the frame width.
const MAX_LINE_FRACTION: f32 = 0.92;
const CHUNK_TAIL: f64 = 0.1;
const WORD_TAIL: f64 = 0.05;

/// Uppercase text stripped of everything the drawtext parser treats specially.
pub fn sanitize_caption(text: &str) -> String {
    let cleaned: String = text
        .to_uppercase()
        .chars()
        .filter(|c| !"\\:'\"[]{}|<>%;,!?.".contains(*c))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Path form drawtext accepts inside a single-quoted option.
fn font_path_arg(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").replace(':', "\\:")
}

fn load_font(path: &Path) -> Result<Font> {
    let data = std::fs::read(path).map_err(|e| {
        PipelineError::ConfigError(format!("Failed to read caption font '{}': {}", path.display(), e))
    })?;
    Font::from_bytes(data.as_slice(), FontSettings::default()).map_err(|e| {
        PipelineError::ConfigError(format!("Failed to load caption font '{}': {}", path.display(), e))
    })
}

#[derive(Clone)]
pub struct CaptionStyle {
    pub font_file: Option<PathBuf>,
    /// Parsed `font_file`, used to measure glyph advances for word placement.
    font: Option<Arc<Font>>,
    pub font_size: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub highlight: String,
}

impl fmt::Debug for CaptionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptionStyle")
            .field("font_file", &self.font_file)
            .field("font_size", &self.font_size)
            .field("frame_width", &self.frame_width)
            .field("frame_height", &self.frame_height)
            .field("highlight", &self.highlight)
            .finish_non_exhaustive()
    }
}

impl CaptionStyle {
    /// Fails when `font_file` is given but cannot be parsed as a font.
    pub fn new(frame_width: u32, frame_height: u32, font_file: Option<PathBuf>, highlight: &str) -> Result<Self> {
        let font = font_file.as_deref().map(load_font).transpose()?.map(Arc::new);
        Ok(Self {
            font_file,
            font,
            font_size: frame_width * 112 / 1080,
            frame_width,
            frame_height,
            highlight: highlight.to_string(),
        })
    }

    fn font_arg(&self) -> String {
        match &self.font_file {
            Some(path) => format!("fontfile='{}'", font_path_arg(path)),
            None => "font=Sans".to_string(),
        }
    }

    fn advance(&self, c: char, size: f32) -> f32 {
        match &self.font {
            Some(font) => font.metrics(c, size).advance_width,
            None if c == ' ' => size * SPACE_WIDTH_RATIO,
            None => size * CHAR_WIDTH_RATIO,
        }
    }

    /// Rendered width of `text` at `size` pixels.
    pub fn text_width(&self, text: &str, size: u32) -> f32 {
        text.chars().map(|c| self.advance(c, size as f32)).sum()
    }

    fn line_width(&self, labels: &[String], size: u32) -> f32 {
        let shown: Vec<&String> = labels.iter().filter(|l| !l.is_empty()).collect();
        let gaps = shown.len().saturating_sub(1) as f32;
        shown.iter().map(|l| self.text_width(l, size)).sum::<f32>() + gaps * self.advance(' ', size as f32)
    }

    /// Base font size, reduced for a line that would not fit the frame.
    fn fitted_size(&self, labels: &[String]) -> u32 {
        let max_width = self.frame_width as f32 * MAX_LINE_FRACTION;
        let natural = self.line_width(labels, self.font_size);
        if natural <= max_width {
            return self.font_size;
        }
        ((self.font_size as f32 * max_width / natural).floor() as u32).max(1)
    }

    fn caption_y(&self) -> u32 {
        self.frame_height * 62 / 100
    }

    #[allow(clippy::too_many_arguments)]
    fn drawtext(&self, text: &str, color: &str, x: &str, y: &str, size: u32, start: f64, end: f64) -> String {
        format!(
            "drawtext={}:text='{}':fontcolor={}:fontsize={}:x={}:y={}:borderw=6:bordercolor=black:enable='between(t,{:.3},{:.3})'",
            self.font_arg(),
            text,
            color,
            size,
            x,
            y,
            start,
            end
        )
    }

    /// Karaoke captions: each three-word chunk in white for its whole span,
    /// with the word being spoken redrawn in the highlight colour on top.
    pub fn caption_filters(&self, words: &[WordTiming]) -> Vec<String> {
        let mut filters = Vec::new();
        let y = self.caption_y().to_string();

        for chunk in words.chunks(CHUNK_WORDS) {
            let labels: Vec<String> = chunk.iter().map(|w| sanitize_caption(&w.word)).collect();
            let line = labels
                .iter()
                .filter(|l| !l.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            if line.is_empty() {
                continue;
            }
            let (first, last) = match (chunk.first(), chunk.last()) {
                (Some(first), Some(last)) => (first, last),
                _ => continue,
            };

            let size = self.fitted_size(&labels);
            let space = self.advance(' ', size as f32);
            let total = self.line_width(&labels, size);
            let start_x = ((self.frame_width as f32 - total) / 2.0).max(0.0);

            filters.push(self.drawtext(
                &line,
                "white",
                &format!("{}", start_x.round() as i64),
                &y,
                size,
                first.start,
                last.end + CHUNK_TAIL,
            ));

            let mut x = start_x;
            for (timing, label) in chunk.iter().zip(&labels) {
                if label.is_empty() {
                    continue;
                }
                filters.push(self.drawtext(
                    label,
                    &self.highlight,
                    &format!("{}", x.round() as i64),
                    &y,
                    size,
                    timing.start,
                    timing.end + WORD_TAIL,
                ));
                x += self.text_width(label, size) + space;
            }
        }
        filters
    }

    /// Large centred hook line over the opening seconds.
    pub fn hook_filter(&self, hook_text: &str, duration: f64) -> Option<String> {
        let text = sanitize_caption(hook_text);
        if text.is_empty() {
            return None;
        }
        let size = self.font_size * 9 / 10;
        Some(format!(
            "{}:box=1:boxcolor=black@0.55:boxborderw=24",
            self.drawtext(
                &text,
                "white",
                "(w-text_w)/2",
                &format!("{}", self.frame_height * 30 / 100),
                size,
                0.0,
                duration,
            )
        ))
    }
}
