//! Concurrent image enrichment.
//!
//! Two levels of fan-out, both structured (no spawned tasks): slides run through
//! `buffer_unordered(max_parallel_slides)`, and each slide scores its
//! candidates with `join_all`. Dropping the returned future cancels every
//! in-flight search and vision call. Results are merged back by slide index,
//! so completion order never changes slide order.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::client::ProviderClient;
use crate::gateway::ProviderErrorKind;
use crate::router::Task;
use crate::types::{ImageCandidate, ImageScore, Slide};

use super::search::ImageSearch;

/// Non-fatal, per-slide enrichment problem.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnrichmentWarning {
    #[error("no candidates for query: {query}")]
    NoCandidates { slide: usize, query: String },
    #[error("image search failed for query: {query}: {message}")]
    SearchFailed {
        slide: usize,
        query: String,
        message: String,
    },
    #[error("image scoring failed for {url}: {message}")]
    ScoringFailed {
        slide: usize,
        url: String,
        message: String,
    },
    #[error("no safe candidate for query: {query}")]
    NoSafeCandidate { slide: usize, query: String },
    #[error("no usable image scores for query: {query}")]
    NoUsableScores { slide: usize, query: String },
}

impl EnrichmentWarning {
    /// 0-based index of the slide the warning is about.
    pub fn slide(&self) -> usize {
        match self {
            Self::NoCandidates { slide, .. }
            | Self::SearchFailed { slide, .. }
            | Self::ScoringFailed { slide, .. }
            | Self::NoSafeCandidate { slide, .. }
            | Self::NoUsableScores { slide, .. } => *slide,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("image enrichment cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    pub slides: Vec<Slide>,
    pub warnings: Vec<EnrichmentWarning>,
}

impl EnrichmentOutcome {
    pub fn images_included(&self) -> usize {
        self.slides.iter().filter(|s| s.image_url.is_some()).count()
    }

    /// Slides that asked for an image and did not get one.
    pub fn images_missing(&self) -> usize {
        self.slides
            .iter()
            .filter(|s| s.wants_image().is_some() && s.image_url.is_none())
            .count()
    }
}

/// Highest-scoring safe candidate; ties go to the better (lower) provider rank.
pub fn select_winner(scored: &[(ImageCandidate, ImageScore)]) -> Option<&ImageCandidate> {
    scored
        .iter()
        .filter(|(_, score)| score.safe)
        .max_by(|(a, sa), (b, sb)| {
            sa.score
                .total_cmp(&sb.score)
                .then_with(|| b.rank.cmp(&a.rank))
        })
        .map(|(candidate, _)| candidate)
}

#[derive(Debug, Default)]
struct SlideImage {
    url: Option<String>,
    warnings: Vec<EnrichmentWarning>,
}

pub struct ImageEnricher<'a> {
    client: &'a ProviderClient,
    search: &'a dyn ImageSearch,
    candidates: usize,
    max_parallel_slides: usize,
}

impl<'a> ImageEnricher<'a> {
    pub fn new(
        client: &'a ProviderClient,
        search: &'a dyn ImageSearch,
        candidates: usize,
        max_parallel_slides: usize,
    ) -> Self {
        Self {
            client,
            search,
            candidates: candidates.max(1),
            max_parallel_slides: max_parallel_slides.max(1),
        }
    }

    /// Fill `image_url` on every slide with an image query. Slides without a
    /// query pass through untouched.
    pub async fn enrich(
        &self,
        mut slides: Vec<Slide>,
        cancel: Option<&AtomicBool>,
    ) -> Result<EnrichmentOutcome, Cancelled> {
        let is_cancelled = || cancel.is_some_and(|flag| flag.load(Ordering::SeqCst));

        let jobs: Vec<(usize, String, String)> = slides
            .iter()
            .enumerate()
            .filter_map(|(idx, slide)| {
                slide
                    .wants_image()
                    .map(|q| (idx, q.to_string(), slide_context(slide)))
            })
            .collect();
        let requested = jobs.len();

        let results: Vec<Option<(usize, SlideImage)>> = stream::iter(jobs)
            .map(|(idx, query, context)| async move {
                if is_cancelled() {
                    return None;
                }
                let image = self.enrich_slide(idx, &query, &context, cancel).await?;
                Some((idx, image))
            })
            .buffer_unordered(self.max_parallel_slides)
            .collect()
            .await;

        if is_cancelled() || results.iter().any(Option::is_none) {
            warn!(requested, "image enrichment cancelled; discarding results");
            return Err(Cancelled);
        }

        let mut merged: Vec<(usize, SlideImage)> = results.into_iter().flatten().collect();
        merged.sort_by_key(|(idx, _)| *idx);

        let mut warnings = Vec::new();
        for (idx, image) in merged {
            if let Some(slide) = slides.get_mut(idx) {
                slide.image_url = image.url;
            }
            warnings.extend(image.warnings);
        }

        let outcome = EnrichmentOutcome { slides, warnings };
        info!(
            requested,
            included = outcome.images_included(),
            missing = outcome.images_missing(),
            "image enrichment done"
        );
        Ok(outcome)
    }

    /// `None` when the run was cancelled while the search was in flight; no
    /// vision calls are made after that.
    async fn enrich_slide(
        &self,
        slide: usize,
        query: &str,
        context: &str,
        cancel: Option<&AtomicBool>,
    ) -> Option<SlideImage> {
        let mut out = SlideImage::default();

        let mut candidates = match self.search.search(query, self.candidates).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(slide, query, error = %err, code = err.code(), "image search failed");
                out.warnings.push(EnrichmentWarning::SearchFailed {
                    slide,
                    query: query.to_string(),
                    message: err.to_string(),
                });
                return Some(out);
            }
        };
        if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            debug!(slide, "cancelled before scoring");
            return None;
        }
        candidates.truncate(self.candidates);
        if candidates.is_empty() {
            out.warnings.push(EnrichmentWarning::NoCandidates {
                slide,
                query: query.to_string(),
            });
            return Some(out);
        }

        let scores = join_all(
            candidates
                .iter()
                .map(|c| self.client.call_vision(Task::ImageVision, &c.url, context)),
        )
        .await;

        let mut scored = Vec::with_capacity(candidates.len());
        for (candidate, result) in candidates.into_iter().zip(scores) {
            match result {
                Ok(score) => scored.push((candidate, score)),
                Err(err) if err.kind() == ProviderErrorKind::Transient => {
                    debug!(slide, url = %candidate.url, error = %err, "dropping candidate after transient error");
                }
                Err(err) => {
                    warn!(slide, url = %candidate.url, error = %err, "dropping candidate");
                    out.warnings.push(EnrichmentWarning::ScoringFailed {
                        slide,
                        url: candidate.url,
                        message: err.to_string(),
                    });
                }
            }
        }

        if scored.is_empty() {
            out.warnings.push(EnrichmentWarning::NoUsableScores {
                slide,
                query: query.to_string(),
            });
            return Some(out);
        }
        match select_winner(&scored) {
            Some(winner) => {
                debug!(slide, url = %winner.url, rank = winner.rank, "image selected");
                out.url = Some(winner.url.clone());
            }
            None => out.warnings.push(EnrichmentWarning::NoSafeCandidate {
                slide,
                query: query.to_string(),
            }),
        }
        Some(out)
    }
}

fn slide_context(slide: &Slide) -> String {
    let bullets: Vec<&str> = slide.bullet_points.iter().take(3).map(String::as_str).collect();
    if bullets.is_empty() {
        slide.title.clone()
    } else {
        format!("{}\n{}", slide.title, bullets.join(" | "))
    }
}
