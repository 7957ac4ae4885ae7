use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const MIN_CLIPS: u32 = 1;
pub const MAX_CLIPS: u32 = 6;
pub const DEFAULT_CLIPS: u32 = 4;

/// One full description of a video to produce. The pipeline takes this and
/// nothing else; there is no ambient UI state behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRequest {
    pub topic: String,
    /// Keywords used to pick thematically matching stock footage.
    pub vibes: Vec<String>,
    /// Narration voice override; `Config::voice` applies when absent.
    pub voice: Option<String>,
    /// Burn captions into the frames instead of only writing the cue file.
    pub captions: bool,
    pub clip_count: u32,
}

impl VideoRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            vibes: Vec::new(),
            voice: None,
            captions: false,
            clip_count: DEFAULT_CLIPS,
        }
    }

    pub fn clamped_clip_count(&self) -> u32 {
        self.clip_count.clamp(MIN_CLIPS, MAX_CLIPS)
    }

    /// Footage search terms: the vibe tags when given, the topic otherwise.
    pub fn search_terms(&self) -> Vec<String> {
        if self.vibes.is_empty() {
            vec![self.topic.clone()]
        } else {
            self.vibes.clone()
        }
    }
}

/// Artifacts of a completed run, all under the run's own directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedVideo {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub video: PathBuf,
    pub script: PathBuf,
    pub subtitles: Option<PathBuf>,
    pub duration: f64,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("script generation failed: {0:#}")]
    Script(anyhow::Error),
    #[error("speech synthesis failed: {0:#}")]
    Synthesis(anyhow::Error),
    #[error("stock footage retrieval failed: {0:#}")]
    Footage(anyhow::Error),
    #[error("video assembly failed: {0:#}")]
    Assembly(anyhow::Error),
    #[error("sheet store failed: {0:#}")]
    Store(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_count_is_clamped() {
        let mut req = VideoRequest::new("discipline");
        assert_eq!(req.clamped_clip_count(), DEFAULT_CLIPS);

        req.clip_count = 0;
        assert_eq!(req.clamped_clip_count(), MIN_CLIPS);

        req.clip_count = 99;
        assert_eq!(req.clamped_clip_count(), MAX_CLIPS);
    }

    #[test]
    fn search_terms_fall_back_to_topic() {
        let mut req = VideoRequest::new("stoicism");
        assert_eq!(req.search_terms(), vec!["stoicism".to_string()]);

        req.vibes = vec!["luxury".into(), "city night".into()];
        assert_eq!(req.search_terms().len(), 2);
    }
}
