use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed, unparsable or generic script response. Fatal to the run.
    #[error("Script generation error: {0}")]
    GenerationError(String),

    /// No provider could supply the visual for a beat. Fatal to the run.
    #[error("Visual resolution error for beat {beat}: {message}")]
    ResolutionError { beat: u32, message: String },

    /// Filter, encoding or duration-contract failure while rendering.
    #[error("Assembly error: {0}")]
    AssemblyError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Environment variable error: {0}")]
    EnvError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Base64 decode error: {0}")]
    DecodeError(#[from] base64::DecodeError),
}

impl PipelineError {
    pub fn resolution(beat: u32, message: impl Into<String>) -> Self {
        PipelineError::ResolutionError {
            beat,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
