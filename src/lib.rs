#![forbid(unsafe_code)]

//! # deck-harness
//!
//! Turns a short brief (topic, duration, audience, language) into a finished
//! slide deck by chaining model calls: outline, spoken manuscript, a review
//! gate with at most one rewrite, slides, speaker notes, and vision-scored
//! images fetched concurrently per slide.
//!
//! Every call is routed per task through a [`ModelRouter`], so cheap models
//! handle extraction and scoring while larger ones write. Stage outputs are
//! typed and validated; a malformed reply gets exactly one corrective retry.

pub mod client;
pub mod config;
pub mod gateway;
pub mod hooks;
pub mod images;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod router;
pub mod stages;
pub mod targets;
pub mod trace;
pub mod types;

pub use client::{ClientUsage, ProviderClient};
pub use config::{ConfigError, ModelSettings, Settings};
pub use gateway::{Attribution, ChatGateway, ProviderError, ProviderGateway, UsageSink};
pub use hooks::{LoggingObserver, ObserverError, PipelineObserver, RunPhase, StageEvent};
pub use images::{EnrichmentWarning, ImageEnricher, ImageSearch, ImageSearchError, UnsplashClient};
pub use pipeline::{Pipeline, PipelineError, PipelineOptions};
pub use render::{DeckMetadata, DeckRenderer, JsonDeckRenderer, RenderError};
pub use router::{ModelRouter, Task};
pub use stages::{GateDecision, QualityGate, Stage, StageError, StageErrorKind};
pub use trace::{CallTrace, JsonlTraceSink, TraceError, TraceSink, TraceWorker};
pub use types::{
    ImageCandidate, ImageScore, Manuscript, Outline, ReviewResult, RunRequest, RunResult, Slide,
    SpeakerProfile, Theme,
};
