mod format;
mod parse;
mod writer;

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

pub use format::VideoFormat;
pub use parse::{parse_script, strip_wrapping};
pub use writer::{ScriptRequest, ScriptWriter, MIN_SCRIPT_WORDS};

/// One segment of the script: a spoken line and the visual that goes with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    /// Ordering key. Never derived from the position in the response.
    #[serde(alias = "beat")]
    pub beat_number: u32,
    /// Spoken line
    pub text: String,
    /// Still-image search prompt; must name the concrete subject of `text`.
    pub image_prompt: String,
    /// Clip search terms
    #[serde(deserialize_with = "keywords_from_string_or_list")]
    pub video_keywords: Vec<String>,
    #[serde(default)]
    pub pace: Pace,
    #[serde(default)]
    pub camera_motion: CameraMotion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pace {
    Fast,
    Slow,
    /// Also taken for any pace the model invents.
    #[default]
    #[serde(other)]
    Medium,
}

impl Pace {
    /// Relative on-screen weight of a beat, in nominal seconds.
    pub fn weight(self) -> f64 {
        match self {
            Pace::Fast => 2.0,
            Pace::Medium => 4.5,
            Pace::Slow => 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraMotion {
    ZoomIn,
    ZoomOut,
    PanRight,
    PanLeft,
    Shake,
    /// Not specified by the model; picked from the beat number at render time.
    #[default]
    #[serde(other)]
    Auto,
}

impl CameraMotion {
    const CYCLE: [CameraMotion; 5] = [
        CameraMotion::ZoomIn,
        CameraMotion::PanRight,
        CameraMotion::ZoomOut,
        CameraMotion::PanLeft,
        CameraMotion::Shake,
    ];

    /// Concrete motion for a beat, resolving `Auto` deterministically.
    pub fn resolve(self, beat_number: u32) -> CameraMotion {
        match self {
            CameraMotion::Auto => Self::CYCLE[beat_number as usize % Self::CYCLE.len()],
            motion => motion,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeywordsRepr {
    Joined(String),
    List(Vec<String>),
}

fn keywords_from_string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let terms = match KeywordsRepr::deserialize(deserializer)? {
        KeywordsRepr::Joined(joined) => joined
            .split(',')
            .map(|s| s.trim().to_string())
            .collect::<Vec<_>>(),
        KeywordsRepr::List(list) => list.into_iter().map(|s| s.trim().to_string()).collect(),
    };
    Ok(terms.into_iter().filter(|s| !s.is_empty()).collect())
}

/// The single response schema: narration and every beat's visual instructions together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub hook_line: String,
    #[serde(default)]
    pub hook_text: String,
    /// Full narration read by the voiceover.
    pub script: String,
    pub beats: Vec<Beat>,
    #[serde(default)]
    pub suggested_music: String,
    #[serde(default)]
    pub voice_type: String,
}

impl Script {
    pub fn word_count(&self) -> usize {
        self.script.split_whitespace().count()
    }

    /// Beats whose visual instructions cannot be traced to their own text.
    pub fn untraceable_beats(&self) -> Vec<u32> {
        self.beats
            .iter()
            .filter(|beat| !beat.is_traceable())
            .map(|beat| beat.beat_number)
            .collect()
    }
}

/// Stock phrases that describe no particular subject.
const GENERIC_PHRASES: &[&str] = &[
    "dark night cinematic",
    "dark cinematic background",
    "abstract background",
    "abstract dark background",
    "cinematic scene",
    "generic background",
    "stock footage",
    "random footage",
    "placeholder",
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "of", "in", "to", "how", "why", "what", "is", "are", "was", "were",
    "be", "been", "i", "you", "we", "they", "it", "this", "that", "for", "on", "at", "by",
    "with", "from", "and", "or", "but", "do", "does", "did", "have", "has", "had", "not",
    "no", "so", "if", "as", "can", "will", "just", "about", "into", "its", "your", "he",
    "she", "his", "her", "him", "them", "their", "our", "my", "me", "us", "then", "than",
    "there", "here", "who", "when", "where", "which", "all", "one", "out", "up", "now",
];

pub(crate) fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lowercased alphanumeric words of `text` with stop words and short words removed.
pub(crate) fn content_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '$')
        .map(|w| w.trim_matches('$').to_lowercase())
        .filter(|w| w.chars().count() > 2 && !is_stop_word(w))
        .collect()
}

/// Crude suffix stripping so "traders"/"trader" and "crashed"/"crash" compare equal.
pub(crate) fn stem(word: &str) -> String {
    for suffix in ["ing", "ed", "es", "s"] {
        if let Some(root) = word.strip_suffix(suffix) {
            if root.chars().count() >= 3 {
                return root.to_string();
            }
        }
    }
    word.to_string()
}

impl Beat {
    pub fn keywords_query(&self) -> String {
        self.video_keywords.join(" ")
    }

    fn is_generic(&self) -> bool {
        let normalize = |s: &str| s.trim().to_lowercase();
        let prompt = normalize(&self.image_prompt);
        let keywords = normalize(&self.keywords_query());
        GENERIC_PHRASES
            .iter()
            .any(|phrase| prompt == *phrase || keywords == *phrase)
    }

    /// True when the image prompt or keywords share a content word with the spoken text.
    pub fn is_traceable(&self) -> bool {
        if self.is_generic() {
            return false;
        }
        let subject: HashSet<String> = content_words(&self.text).iter().map(|w| stem(w)).collect();
        if subject.is_empty() {
            return false;
        }
        content_words(&self.image_prompt)
            .into_iter()
            .chain(content_words(&self.keywords_query()))
            .any(|w| subject.contains(&stem(&w)))
    }
}
