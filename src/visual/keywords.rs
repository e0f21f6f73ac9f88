use std::collections::HashSet;

use tracing::info;

use crate::script::{content_words, is_stop_word, Beat};

/// Words stock libraries have no footage of.
const ABSTRACT_WORDS: &[&str] = &[
    "psychological", "psychology", "abstract", "invisible", "concept", "emotion",
    "metaphor", "symbolic", "theory", "mental", "cognitive", "subconscious", "aversion",
    "bias", "bubble", "fomo", "algorithm", "influence", "manipulation", "trick",
    "anchoring", "persuasion", "heuristic", "effect", "principle", "technique",
];

/// Well-known people and brands that return nothing useful from stock search.
const NAME_BLOCKLIST: &[&str] = &[
    "elon", "musk", "zuckerberg", "mark", "buffett", "warren", "bezos", "gates", "bill",
    "jobs", "steve", "cialdini", "robert", "freud", "trump", "obama", "biden", "powell",
    "munger", "dalio", "ray", "soros", "george", "tesla", "facebook", "meta", "google",
    "apple", "amazon", "microsoft", "twitter", "tiktok", "instagram", "youtube",
];

const VARIATIONS: &[&str] = &[
    "close up", "wide angle", "aerial view", "slow motion", "night scene",
    "dramatic light", "silhouette", "interior", "exterior", "detail shot",
];

/// Camera and render vocabulary that describes the shot rather than its subject.
const PROMPT_BOILERPLATE: &[&str] = &[
    "photorealistic", "cinematic", "dark", "vertical", "ultra", "detailed", "resolution",
    "lighting", "light", "glow", "shot", "extreme", "close", "wide", "angle", "lens",
    "close-up", "film", "grain", "bokeh", "depth", "field", "shallow", "dramatic", "behind",
    "background", "aspect", "ratio", "year", "old",
];

const IMAGE_QUERY_WORDS: usize = 4;
const FALLBACK_KEYWORD_WORDS: usize = 4;

fn is_blocked(word: &str) -> bool {
    let bare = word
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    let singular = bare.strip_suffix('s').unwrap_or(&bare);
    [bare.as_str(), singular]
        .iter()
        .any(|w| ABSTRACT_WORDS.contains(w) || NAME_BLOCKLIST.contains(w))
}

/// Drops abstract words, blocked names and capitalised words after the first.
fn sanitize(keywords: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for word in keywords.split_whitespace() {
        if is_blocked(word) {
            continue;
        }
        let capitalised = word.chars().next().is_some_and(char::is_uppercase)
            && word.chars().count() > 2
            && !word.chars().all(|c| !c.is_lowercase());
        if !kept.is_empty() && capitalised {
            continue;
        }
        kept.push(word);
    }
    kept.join(" ")
}

/// Builds the clip query for each beat of one run, keeping queries distinct across beats.
#[derive(Debug, Default)]
pub struct KeywordPlanner {
    used: HashSet<String>,
}

impl KeywordPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clip_query(&mut self, beat: &Beat) -> String {
        let original = beat.keywords_query();
        let mut query = sanitize(&original);
        if query != original && !query.is_empty() {
            info!("Beat {} keywords sanitized: '{}' -> '{}'", beat.beat_number, original, query);
        }

        if query.trim().is_empty() {
            query = content_words(&beat.text)
                .into_iter()
                .take(FALLBACK_KEYWORD_WORDS)
                .collect::<Vec<_>>()
                .join(" ");
            info!("Beat {} keywords rebuilt from text: '{}'", beat.beat_number, query);
        }

        let base = query.clone();
        for variation in VARIATIONS {
            if !self.used.contains(&query) {
                break;
            }
            query = format!("{} {}", base, variation);
        }
        self.used.insert(query.clone());
        query
    }
}

/// Subject words of an image prompt, without stop words or photographic boilerplate.
pub fn image_query(beat: &Beat) -> String {
    let words: Vec<String> = beat
        .image_prompt
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| w.chars().count() > 2)
        .filter(|w| !w.chars().any(|c| c.is_ascii_digit()))
        .filter(|w| !is_stop_word(w) && !PROMPT_BOILERPLATE.contains(&w.as_str()))
        .take(IMAGE_QUERY_WORDS)
        .collect();
    if words.is_empty() {
        content_words(&beat.text)
            .into_iter()
            .take(IMAGE_QUERY_WORDS)
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        words.join(" ")
    }
}
