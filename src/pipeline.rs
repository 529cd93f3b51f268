//! Brief → outline → manuscript → review → slides → notes → images → deck.
//!
//! The orchestrator owns the run: it validates the request, builds a per-run
//! [`ProviderClient`] (so call counts and cost are per run), sequences the
//! stages, and hands the finished slides to the renderer. Stages run one at a
//! time; the only fan-out is image enrichment.
//!
//! Usage:
//! ```bash
//! deck run --topic "Solar power" --duration 10 --audience students --language English
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::ProviderClient;
use crate::config::Settings;
use crate::gateway::ChatGateway;
use crate::hooks::{PipelineObserver, RunPhase, StageEvent};
use crate::images::{ImageEnricher, ImageSearch};
use crate::render::{export_manuscript_markdown, DeckMetadata, DeckRenderer, RenderError};
use crate::router::ModelRouter;
use crate::stages::{
    add_speaker_notes, generate_manuscript, generate_outline, generate_slides, review_manuscript,
    GateDecision, QualityGate, StageError,
};
use crate::targets::PresentationTargets;
use crate::trace::TraceSink;
use crate::types::{RequestError, RunRequest, RunResult};

// =============================================================================
// Errors and options
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Stage(_) => "stage_failed",
            Self::Render(_) => "render_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub review_threshold: u8,
    pub image_candidates: usize,
    pub max_parallel_slides: usize,
    pub fact_check: bool,
    /// Write `<stem>_script.md` next to the deck.
    pub export_manuscript: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            review_threshold: settings.review_threshold,
            image_candidates: settings.image_candidates,
            max_parallel_slides: settings.max_parallel_slides,
            fact_check: settings.fact_check,
            export_manuscript: true,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

pub struct Pipeline {
    gateway: Arc<dyn ChatGateway>,
    router: Arc<ModelRouter>,
    renderer: Arc<dyn DeckRenderer>,
    search: Option<Arc<dyn ImageSearch>>,
    observer: Option<Arc<dyn PipelineObserver>>,
    trace: Option<Arc<dyn TraceSink>>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        router: Arc<ModelRouter>,
        renderer: Arc<dyn DeckRenderer>,
    ) -> Self {
        Self {
            gateway,
            router,
            renderer,
            search: None,
            observer: None,
            trace: None,
            options: PipelineOptions::default(),
        }
    }

    /// Router and options from validated settings.
    pub fn from_settings(
        gateway: Arc<dyn ChatGateway>,
        renderer: Arc<dyn DeckRenderer>,
        settings: &Settings,
    ) -> Self {
        let router = Arc::new(ModelRouter::from_settings(&settings.models));
        Self::new(gateway, router, renderer).with_options(PipelineOptions::from_settings(settings))
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Without a search provider, slides keep their image queries but get no
    /// images.
    pub fn with_image_search(mut self, search: Arc<dyn ImageSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_trace(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    async fn notify(&self, phase: RunPhase, detail: impl Into<String>) {
        let Some(observer) = &self.observer else {
            return;
        };
        if let Err(err) = observer.on_stage(StageEvent::new(phase, detail)).await {
            warn!(stage = phase.as_str(), error = %err, "pipeline observer failed");
        }
    }

    /// Run one brief end to end and write the deck to `output`.
    ///
    /// `cancel` is checked before every stage and before each slide's image
    /// work starts. A cancelled run returns [`PipelineError::Cancelled`] and
    /// writes nothing.
    pub async fn run(
        &self,
        req: RunRequest,
        output: &Path,
        cancel: Option<&AtomicBool>,
    ) -> Result<RunResult, PipelineError> {
        req.validate()?;

        let run_id = Uuid::new_v4();
        let mut client =
            ProviderClient::new(self.gateway.clone(), self.router.clone()).with_run(run_id);
        if let Some(trace) = &self.trace {
            client = client.with_trace(trace.clone());
        }
        let targets = PresentationTargets::for_request(&req);
        let mut warnings: Vec<String> = Vec::new();

        info!(
            %run_id,
            topic = %req.topic,
            duration = req.duration_minutes,
            audience = %req.audience,
            min_slides = targets.min_slides,
            max_slides = targets.max_slides,
            "run started"
        );

        // --- Outline ---
        check_cancel(cancel)?;
        self.notify(RunPhase::Outline, "Planning structure").await;
        let outline = generate_outline(&client, &req, &targets).await?;
        warnings.extend(outline.warnings);

        // --- Manuscript ---
        check_cancel(cancel)?;
        self.notify(RunPhase::Manuscript, "Writing manuscript").await;
        let manuscript = generate_manuscript(&client, &req, &outline.value, &targets).await?;
        warnings.extend(manuscript.warnings);

        // --- Review (+ rewrite, + fact check) ---
        check_cancel(cancel)?;
        self.notify(RunPhase::Review, "Reviewing manuscript").await;
        let reviewed = review_manuscript(
            &client,
            &req,
            manuscript.value,
            QualityGate::new(self.options.review_threshold),
            self.options.fact_check,
        )
        .await?;
        warnings.extend(reviewed.warnings);
        let manuscript = reviewed.manuscript;

        // --- Slides ---
        check_cancel(cancel)?;
        self.notify(
            RunPhase::Slides,
            format!("Manuscript scored {}/10; creating slides", reviewed.review.score),
        )
        .await;
        let slides = generate_slides(&client, &req, &manuscript, &targets).await?;
        warnings.extend(slides.warnings);

        // --- Notes ---
        check_cancel(cancel)?;
        self.notify(RunPhase::Notes, "Adding speaker notes").await;
        let slides = add_speaker_notes(&client, &manuscript, slides.value).await?;
        warnings.extend(slides.warnings);
        let slides = slides.value;

        // --- Images ---
        check_cancel(cancel)?;
        self.notify(RunPhase::Images, "Selecting images").await;
        let slides = match &self.search {
            Some(search) => {
                let enricher = ImageEnricher::new(
                    &client,
                    search.as_ref(),
                    self.options.image_candidates,
                    self.options.max_parallel_slides,
                );
                let outcome = enricher
                    .enrich(slides, cancel)
                    .await
                    .map_err(|_| PipelineError::Cancelled)?;
                warnings.extend(outcome.warnings.iter().map(ToString::to_string));
                outcome.slides
            }
            None => {
                let wanted = slides.iter().filter(|s| s.wants_image().is_some()).count();
                if wanted > 0 {
                    warnings.push(format!(
                        "image search disabled; {wanted} slides left without images"
                    ));
                }
                slides
            }
        };

        // --- Render ---
        check_cancel(cancel)?;
        self.notify(RunPhase::Render, "Exporting files").await;
        let meta = DeckMetadata {
            run_id,
            title: manuscript.title.clone(),
            topic: req.topic.clone(),
            audience: req.audience.clone(),
            language: req.language.clone(),
            duration_minutes: req.duration_minutes,
            theme: req.theme,
            generated_at: Utc::now(),
        };
        let output_path = self.renderer.render(&slides, &meta, output)?;

        let script_path = if self.options.export_manuscript {
            match export_manuscript_markdown(&manuscript, &meta, &output_path) {
                Ok(path) => Some(path),
                Err(err) => {
                    warn!(error = %err, "manuscript export failed");
                    warnings.push(format!("manuscript export failed: {err}"));
                    None
                }
            }
        } else {
            None
        };

        let images_included = slides.iter().filter(|s| s.image_url.is_some()).count();
        let images_missing = slides
            .iter()
            .filter(|s| s.wants_image().is_some() && s.image_url.is_none())
            .count();
        let usage = client.usage();

        let result = RunResult {
            run_id,
            output_path,
            script_path,
            slide_count: slides.len(),
            images_included,
            images_missing,
            warnings,
            review_score: reviewed.review.score,
            rewritten: reviewed.decision == GateDecision::Rewritten,
            provider_calls: usage.calls,
            cost_nanodollars: usage.cost_nanodollars,
        };

        self.notify(RunPhase::Done, "Done").await;
        info!(
            %run_id,
            slides = result.slide_count,
            images = result.images_included,
            images_missing = result.images_missing,
            warnings = result.warnings.len(),
            calls = result.provider_calls,
            cost_usd = result.cost_nanodollars as f64 / 1_000_000_000.0,
            "run finished"
        );
        Ok(result)
    }
}

fn check_cancel(cancel: Option<&AtomicBool>) -> Result<(), PipelineError> {
    match cancel {
        Some(flag) if flag.load(Ordering::SeqCst) => Err(PipelineError::Cancelled),
        _ => Ok(()),
    }
}
