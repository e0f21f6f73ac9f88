mod captions;
mod ffmpeg;
mod generator;
mod timing;

pub use captions::{sanitize_caption, words_from_alignment, CaptionStyle, WordTiming};
pub use ffmpeg::{ensure_tools, probe_duration, run_ffmpeg};
pub use generator::{Assembler, RenderedOutput, Segment};
pub use timing::{allocate_frames, frames_for, within_tolerance};
