pub mod analytics;
pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod script;
pub mod topic;
pub mod video;
pub mod visual;
pub mod volume;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, RunReport, RunRequest};
