//! Extension hooks for embedding the pipeline.
//!
//! Callers that want progress (a UI, a job table) inject a
//! [`PipelineObserver`]. Observer failures are logged and never abort a run.

use tracing::info;

/// Where a run is, in coarse steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Outline,
    Manuscript,
    Review,
    Slides,
    Notes,
    Images,
    Render,
    Done,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Outline => "outline",
            RunPhase::Manuscript => "manuscript",
            RunPhase::Review => "review",
            RunPhase::Slides => "slides",
            RunPhase::Notes => "notes",
            RunPhase::Images => "images",
            RunPhase::Render => "render",
            RunPhase::Done => "done",
        }
    }

    /// Rough share of the run completed once this phase starts.
    pub fn percent(&self) -> u8 {
        match self {
            RunPhase::Outline => 5,
            RunPhase::Manuscript => 15,
            RunPhase::Review => 25,
            RunPhase::Slides => 55,
            RunPhase::Notes => 70,
            RunPhase::Images => 80,
            RunPhase::Render => 92,
            RunPhase::Done => 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageEvent {
    pub stage: RunPhase,
    pub percent: u8,
    pub detail: String,
}

impl StageEvent {
    pub fn new(stage: RunPhase, detail: impl Into<String>) -> Self {
        Self {
            stage,
            percent: stage.percent(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("{0}")]
    Message(String),
}

#[async_trait::async_trait]
pub trait PipelineObserver: Send + Sync {
    async fn on_stage(&self, event: StageEvent) -> Result<(), ObserverError>;
}

/// Observer that logs each transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

#[async_trait::async_trait]
impl PipelineObserver for LoggingObserver {
    async fn on_stage(&self, event: StageEvent) -> Result<(), ObserverError> {
        info!(
            stage = event.stage.as_str(),
            percent = event.percent,
            "{}",
            event.detail
        );
        Ok(())
    }
}
