mod keywords;
mod resolver;

use std::fmt;
use std::path::PathBuf;

use crate::script::Beat;

pub use keywords::{image_query, KeywordPlanner};
pub use resolver::VisualResolver;

/// What kind of visual a beat gets. Decided only by the parity of its beat number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualKind {
    Image,
    Clip,
}

impl VisualKind {
    /// Odd beats are still images, even beats are clips.
    pub fn for_beat(beat_number: u32) -> Self {
        if beat_number % 2 == 1 {
            VisualKind::Image
        } else {
            VisualKind::Clip
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            VisualKind::Image => "jpg",
            VisualKind::Clip => "mp4",
        }
    }
}

impl fmt::Display for VisualKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisualKind::Image => write!(f, "image"),
            VisualKind::Clip => write!(f, "clip"),
        }
    }
}

/// `beat_<NN>_source.<ext>`, where `NN` is the zero-padded beat number.
pub fn asset_file_name(beat_number: u32) -> String {
    format!(
        "beat_{:02}_source.{}",
        beat_number,
        VisualKind::for_beat(beat_number).extension()
    )
}

/// Recovers the beat number embedded in an asset file name.
pub fn beat_number_from_file_name(name: &str) -> Option<u32> {
    name.strip_prefix("beat_")?
        .split_once("_source.")
        .and_then(|(digits, _)| digits.parse().ok())
}

/// A resolved visual on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualAsset {
    pub beat_number: u32,
    pub kind: VisualKind,
    pub path: PathBuf,
}

/// A beat paired with its visual; the assembler consumes a list of these directly.
#[derive(Debug, Clone)]
pub struct ResolvedBeat {
    pub beat: Beat,
    pub asset: VisualAsset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_picks_the_kind() {
        assert_eq!(VisualKind::for_beat(1), VisualKind::Image);
        assert_eq!(VisualKind::for_beat(2), VisualKind::Clip);
        assert_eq!(VisualKind::for_beat(11), VisualKind::Image);
        assert_eq!(VisualKind::for_beat(40), VisualKind::Clip);
    }

    #[test]
    fn file_name_encodes_padded_beat_number() {
        assert_eq!(asset_file_name(1), "beat_01_source.jpg");
        assert_eq!(asset_file_name(6), "beat_06_source.mp4");
        assert_eq!(asset_file_name(12), "beat_12_source.mp4");
        assert_eq!(asset_file_name(105), "beat_105_source.jpg");
    }

    #[test]
    fn beat_number_round_trips_through_file_name() {
        for n in [1, 2, 9, 10, 33] {
            assert_eq!(beat_number_from_file_name(&asset_file_name(n)), Some(n));
        }
        assert_eq!(beat_number_from_file_name("segment_3.mp4"), None);
    }
}
