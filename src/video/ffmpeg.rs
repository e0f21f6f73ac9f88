use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Last lines of FFmpeg's stderr worth putting in an error message.
const STDERR_TAIL_LINES: usize = 12;

/// Fails early when `ffmpeg` or `ffprobe` is not on the PATH.
pub fn ensure_tools() -> Result<()> {
    for tool in ["ffmpeg", "ffprobe"] {
        which::which(tool).map_err(|_| {
            PipelineError::ConfigError(format!("{} not found on PATH", tool))
        })?;
    }
    Ok(())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n")
}

/// Runs `ffmpeg -y <args>` and surfaces stderr on failure.
pub async fn run_ffmpeg(args: &[String], step: &str) -> Result<()> {
    debug!("ffmpeg {}", args.join(" "));
    let output = Command::new("ffmpeg")
        .arg("-y")
        .args(["-hide_banner", "-loglevel", "error"])
        .args(args)
        .output()
        .await
        .map_err(|e| PipelineError::FfmpegError(format!("Failed to run FFmpeg: {}", e)))?;

    if !output.status.success() {
        return Err(PipelineError::FfmpegError(format!(
            "{} failed: {}",
            step,
            stderr_tail(&output.stderr)
        )));
    }

    info!("{} done", step);
    Ok(())
}

/// Container duration in seconds.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| PipelineError::FfmpegError(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(PipelineError::FfmpegError(format!(
            "ffprobe failed on {}: {}",
            path.display(),
            stderr_tail(&output.stderr)
        )));
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
        PipelineError::FfmpegError(format!("ffprobe returned no duration for {}", path.display()))
    })
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<f64>().ok())
        .find(|d| d.is_finite() && *d > 0.0)
}
