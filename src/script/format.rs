use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    StoryLesson,
    ScaryTruth,
    HiddenPsychology,
}

const STORY_KEYWORDS: &[&str] = &[
    "trader", "market", "invest", "bitcoin", "stock", "billionaire", "money", "broke",
    "million", "failed", "startup", "bankrupt", "hedge", "crypto", "wealth", "entrepreneur",
    "ceo", "fired",
];

const SCARY_KEYWORDS: &[&str] = &[
    "disappear", "mystery", "cover", "secret", "conspiracy", "ghost", "haunted", "killed",
    "dark truth", "government", "suppressed", "experiment", "evidence", "cover-up", "missing",
];

const PSYCHOLOGY_KEYWORDS: &[&str] = &[
    "psychology", "manipulat", "narciss", "toxic", "mental", "trauma", "brain", "mind",
    "self-sabotage", "pattern", "behavior", "childhood", "social media", "habit",
];

impl VideoFormat {
    pub const ALL: [VideoFormat; 3] = [
        VideoFormat::StoryLesson,
        VideoFormat::ScaryTruth,
        VideoFormat::HiddenPsychology,
    ];

    pub fn key(self) -> &'static str {
        match self {
            VideoFormat::StoryLesson => "story_lesson",
            VideoFormat::ScaryTruth => "scary_truth",
            VideoFormat::HiddenPsychology => "hidden_psychology",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            VideoFormat::StoryLesson => "Story Lesson",
            VideoFormat::ScaryTruth => "Scary Truth",
            VideoFormat::HiddenPsychology => "Hidden Psychology",
        }
    }

    /// Target spoken length in seconds.
    pub fn length_range(self) -> (u32, u32) {
        match self {
            VideoFormat::StoryLesson => (70, 100),
            VideoFormat::ScaryTruth => (60, 90),
            VideoFormat::HiddenPsychology => (60, 80),
        }
    }

    pub fn voice_type(self) -> &'static str {
        match self {
            VideoFormat::StoryLesson => "deep_male",
            VideoFormat::ScaryTruth => "whispery_male",
            VideoFormat::HiddenPsychology => "calm_female",
        }
    }

    pub fn music_mood(self) -> &'static str {
        match self {
            VideoFormat::StoryLesson => "cinematic",
            VideoFormat::ScaryTruth => "tense",
            VideoFormat::HiddenPsychology => "dark_ambient",
        }
    }

    pub fn seed_topics(self) -> &'static [&'static str] {
        match self {
            VideoFormat::StoryLesson => &[
                "billionaire who lost everything and came back",
                "trader who discovered a psychological pattern",
                "entrepreneur who failed 5 times before succeeding",
                "investor who predicted a market crash",
                "CEO who was fired and built a bigger company",
                "hedge fund manager who outsmarted Wall Street",
                "crypto whale who went broke and rebuilt",
            ],
            VideoFormat::ScaryTruth => &[
                "building that predicted its own destruction",
                "person who disappeared and was found years later",
                "historical event that was covered up",
                "conspiracy that turned out to be true",
                "place that appears and disappears on maps",
                "government experiment that went wrong",
                "technology that was suppressed for decades",
            ],
            VideoFormat::HiddenPsychology => &[
                "manipulation signs in relationships",
                "psychological tricks used on you daily",
                "why smart people stay poor",
                "signs someone secretly resents you",
                "dark side of social media on your brain",
                "how your childhood trauma runs your adult life",
                "psychological reason you self-sabotage",
            ],
        }
    }

    pub fn structure(self) -> &'static str {
        match self {
            VideoFormat::StoryLesson => {
                "1. HOOK (0-5s): the most shocking moment of the story first, no context.\n\
                 2. REWIND (5-15s): \"But let's go back to the beginning...\" Build context fast.\n\
                 3. THE STORY (15-70s): the full real story, specific details, rising tension.\n\
                 4. THE LESSON (70-100s): the psychology, finance or business insight as a revealed secret.\n\
                 5. THE PUNCHLINE: one line worth a screenshot.\n\
                 6. REWATCH TRIGGER: \"Go back to [specific moment]. You missed something important.\""
            }
            VideoFormat::ScaryTruth => {
                "1. HOOK (0-5s): the most terrifying detail first, no context.\n\
                 2. SETUP (5-20s): \"Here's what most people don't know...\" Establish the mystery.\n\
                 3. THE EVIDENCE (20-60s): real facts, dates, locations. Building dread.\n\
                 4. THE TWIST (60-80s): the detail that changes everything.\n\
                 5. CLIFFHANGER (80-90s): leave one question unanswered."
            }
            VideoFormat::HiddenPsychology => {
                "1. HOOK (0-3s): a statement that sounds impossible but is true.\n\
                 2. PROOF (3-20s): three real facts that prove it. Fast.\n\
                 3. THE DEEP TRUTH (20-45s): why this happens, the psychology behind it.\n\
                 4. PERSONAL HIT (45-55s): \"You've already experienced this.\"\n\
                 5. REWATCH TRIGGER (55-60s): \"Read the first line again. Now it hits different.\""
            }
        }
    }

    /// Keyword match against the idea; `None` when nothing matches.
    pub fn infer(idea: &str) -> Option<Self> {
        let idea = idea.to_lowercase();
        let matches = |words: &[&str]| words.iter().any(|w| idea.contains(w));
        if matches(STORY_KEYWORDS) {
            Some(VideoFormat::StoryLesson)
        } else if matches(SCARY_KEYWORDS) {
            Some(VideoFormat::ScaryTruth)
        } else if matches(PSYCHOLOGY_KEYWORDS) {
            Some(VideoFormat::HiddenPsychology)
        } else {
            None
        }
    }

    pub fn infer_or_random(idea: &str) -> Self {
        Self::infer(idea).unwrap_or_else(Self::random)
    }

    pub fn random() -> Self {
        *Self::ALL
            .choose(&mut rand::rng())
            .unwrap_or(&VideoFormat::StoryLesson)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_picks_format_from_idea_keywords() {
        assert_eq!(
            VideoFormat::infer("trader who lost $420k in 4 minutes"),
            Some(VideoFormat::StoryLesson)
        );
        assert_eq!(
            VideoFormat::infer("the hiker who went missing in 1972"),
            Some(VideoFormat::ScaryTruth)
        );
        assert_eq!(
            VideoFormat::infer("why toxic friends feel like home"),
            Some(VideoFormat::HiddenPsychology)
        );
        assert_eq!(VideoFormat::infer("lighthouse keepers"), None);
    }

    #[test]
    fn keys_round_trip() {
        for format in VideoFormat::ALL {
            assert_eq!(VideoFormat::from_key(format.key()), Some(format));
        }
        assert_eq!(VideoFormat::from_key("cooking"), None);
    }
}
