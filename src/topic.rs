use std::collections::HashSet;

use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::script::{is_stop_word, VideoFormat};

/// Topics sharing this many meaningful words count as the same story.
const SAME_TOPIC_OVERLAP: usize = 3;

/// Lowercased alphanumeric words of a topic, without stop words.
pub fn topic_words(topic: &str) -> HashSet<String> {
    topic
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .filter(|w| *w != "s" && !is_stop_word(w))
        .map(str::to_string)
        .collect()
}

pub fn is_fresh(candidate: &str, used: &[String]) -> bool {
    let words = topic_words(candidate);
    used.iter().all(|old| {
        let old_words = topic_words(old);
        if !words.is_empty() && words == old_words {
            return false;
        }
        words.intersection(&old_words).count() < SAME_TOPIC_OVERLAP
    })
}

/// First fresh seed topic, visiting formats in random order.
pub fn pick_fresh_topic(used: &[String]) -> Option<(String, VideoFormat)> {
    let mut formats = VideoFormat::ALL.to_vec();
    formats.shuffle(&mut rand::rng());
    pick_from(&formats, used)
}

fn pick_from(formats: &[VideoFormat], used: &[String]) -> Option<(String, VideoFormat)> {
    for format in formats {
        let mut seeds: Vec<&str> = format.seed_topics().to_vec();
        seeds.shuffle(&mut rand::rng());
        for seed in seeds {
            if is_fresh(seed, used) {
                info!("Picked {} topic: {}", format.key(), seed);
                return Some((seed.to_string(), *format));
            }
            debug!("Skipping '{}': already used", seed);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_words_drop_noise() {
        let words = topic_words("Why the Bank's Vault was EMPTY?");
        let expected: HashSet<String> = ["banks", "vault", "empty"].iter().map(|s| s.to_string()).collect();
        assert_eq!(words, expected);
    }

    #[test]
    fn three_shared_words_mean_same_topic() {
        let used = vec!["The night the bank vault stood empty".to_string()];
        assert!(!is_fresh("Empty bank vault at night", &used));
        assert!(is_fresh("The bank that never opened", &used));
        assert!(!is_fresh("night bank vault empty stood", &used));
    }

    #[test]
    fn picks_an_unused_seed() {
        let format = VideoFormat::ScaryTruth;
        let seeds = format.seed_topics();
        let used: Vec<String> = seeds[..seeds.len() - 1].iter().map(|s| s.to_string()).collect();
        let (topic, picked) = pick_from(&[format], &used).unwrap();
        assert_eq!(picked, format);
        assert!(is_fresh(&topic, &used));
    }

    #[test]
    fn exhausted_seeds_yield_nothing() {
        let format = VideoFormat::HiddenPsychology;
        let used: Vec<String> = format.seed_topics().iter().map(|s| s.to_string()).collect();
        assert!(pick_from(&[format], &used).is_none());
    }
}
