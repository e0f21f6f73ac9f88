use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{stream, StreamExt, TryStreamExt};
use tracing::{info, warn};

use super::{asset_file_name, image_query, KeywordPlanner, ResolvedBeat, VisualAsset, VisualKind};
use crate::api::VisualSource;
use crate::error::{PipelineError, Result};
use crate::script::Beat;

/// Fetches one visual per beat from an ordered chain of stock providers.
pub struct VisualResolver {
    sources: Vec<Arc<dyn VisualSource>>,
    images_dir: PathBuf,
    clips_dir: PathBuf,
    concurrency: usize,
}

impl VisualResolver {
    pub fn new(sources: Vec<Arc<dyn VisualSource>>, images_dir: PathBuf, clips_dir: PathBuf) -> Self {
        Self {
            sources,
            images_dir,
            clips_dir,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Where the asset for `beat_number` lives.
    pub fn destination(&self, beat_number: u32) -> PathBuf {
        let dir = match VisualKind::for_beat(beat_number) {
            VisualKind::Image => &self.images_dir,
            VisualKind::Clip => &self.clips_dir,
        };
        dir.join(asset_file_name(beat_number))
    }

    /// Resolves every beat or fails the whole run. Output is sorted by beat number.
    pub async fn resolve(&self, beats: &[Beat]) -> Result<Vec<ResolvedBeat>> {
        tokio::fs::create_dir_all(&self.images_dir).await?;
        tokio::fs::create_dir_all(&self.clips_dir).await?;

        // Queries are planned in beat order so de-duplication does not depend on fetch timing.
        let mut planner = KeywordPlanner::new();
        let jobs: Vec<(Beat, String)> = beats
            .iter()
            .map(|beat| {
                let query = match VisualKind::for_beat(beat.beat_number) {
                    VisualKind::Image => image_query(beat),
                    VisualKind::Clip => planner.clip_query(beat),
                };
                (beat.clone(), query)
            })
            .collect();

        info!(
            "Resolving visuals for {} beats ({} at a time)",
            jobs.len(),
            self.concurrency
        );

        let mut resolved: Vec<ResolvedBeat> = stream::iter(jobs)
            .map(|(beat, query)| self.resolve_one(beat, query))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        resolved.sort_by_key(|r| r.beat.beat_number);
        Ok(resolved)
    }

    async fn resolve_one(&self, beat: Beat, query: String) -> Result<ResolvedBeat> {
        let number = beat.beat_number;
        let kind = VisualKind::for_beat(number);
        let dest = self.destination(number);

        if query.trim().is_empty() {
            return Err(PipelineError::resolution(number, "no searchable terms"));
        }

        let mut failures = Vec::new();
        for source in &self.sources {
            match source.fetch(kind, &query, &dest).await {
                Ok(()) => {
                    info!("Beat {}: {} from {} -> {}", number, kind, source.name(), dest.display());
                    return Ok(ResolvedBeat {
                        beat,
                        asset: VisualAsset {
                            beat_number: number,
                            kind,
                            path: dest,
                        },
                    });
                }
                Err(e) => {
                    warn!("Beat {}: {} lookup on {} failed: {}", number, kind, source.name(), e);
                    failures.push(format!("{}: {}", source.name(), e));
                    tokio::fs::remove_file(&dest).await.ok();
                }
            }
        }

        if failures.is_empty() {
            return Err(PipelineError::resolution(number, "no visual providers configured"));
        }
        Err(PipelineError::resolution(
            number,
            format!("no {} for '{}' ({})", kind, query, failures.join("; ")),
        ))
    }
}
