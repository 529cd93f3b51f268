//! Review stage: evaluate, at most one rewrite, optional fact-check patch.
//!
//! The quality gate is a two-state decision taken once per run. Whatever the
//! rewritten manuscript would score, it is never evaluated again.

use serde::Deserialize;
use tracing::{info, warn};

use crate::client::ProviderClient;
use crate::config::DEFAULT_REVIEW_THRESHOLD;
use crate::prompts::{fact_check_prompt, review_prompt, rewrite_prompt};
use crate::router::Task;
use crate::types::{Manuscript, ManuscriptSection, ReviewResult, RunRequest};

use super::manuscript::validate_manuscript;
use super::{run_with_correction, Stage, StageError, Verdict};

// =============================================================================
// Quality gate
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accepted,
    Rewritten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityGate {
    pub threshold: u8,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_REVIEW_THRESHOLD,
        }
    }
}

impl QualityGate {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    pub fn decide(&self, review: &ReviewResult) -> GateDecision {
        if review.score >= self.threshold {
            GateDecision::Accepted
        } else {
            GateDecision::Rewritten
        }
    }
}

fn validate_review(review: &ReviewResult) -> Verdict {
    if review.score > 10 {
        return Verdict::Reject(format!("score must be in [0,10], got {}", review.score));
    }
    Verdict::Accept
}

// =============================================================================
// Fact check
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FactCheckIssue {
    #[serde(default)]
    pub original_text: String,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub corrected_text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactCheckReport {
    #[serde(default)]
    pub issues: Vec<FactCheckIssue>,
}

/// Replace the first occurrence of each flagged quote in each section.
/// Quotes that do not appear verbatim are ignored.
///
/// A quote repeated across sections is patched once per section, but the
/// returned count is the number of report issues that matched at least once.
pub fn apply_patches(manuscript: &Manuscript, report: &FactCheckReport) -> (Manuscript, usize) {
    let mut matched = vec![false; report.issues.len()];
    let sections = manuscript
        .sections
        .iter()
        .map(|section| {
            let mut content = section.content.clone();
            for (issue, hit) in report.issues.iter().zip(matched.iter_mut()) {
                if issue.original_text.is_empty() || !content.contains(&issue.original_text) {
                    continue;
                }
                content = content.replacen(&issue.original_text, &issue.corrected_text, 1);
                *hit = true;
            }
            ManuscriptSection {
                name: section.name.clone(),
                content,
            }
        })
        .collect();
    (
        Manuscript {
            title: manuscript.title.clone(),
            sections,
        },
        matched.into_iter().filter(|hit| *hit).count(),
    )
}

async fn fact_check(
    client: &ProviderClient,
    req: &RunRequest,
    manuscript: &Manuscript,
) -> Result<(Manuscript, usize), String> {
    let prompt = fact_check_prompt(req, manuscript);
    let report: FactCheckReport = client
        .call_structured(Task::FactCheck, &prompt)
        .await
        .map_err(|e| e.to_string())?;
    if report.issues.is_empty() {
        return Ok((manuscript.clone(), 0));
    }
    let (patched, applied) = apply_patches(manuscript, &report);
    // Patches must never empty a section.
    if validate_manuscript(&patched) != Verdict::Accept {
        return Err("patched manuscript lost section content".to_string());
    }
    Ok((patched, applied))
}

// =============================================================================
// Stage
// =============================================================================

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub manuscript: Manuscript,
    pub review: ReviewResult,
    pub decision: GateDecision,
    pub fact_patches: usize,
    pub warnings: Vec<String>,
}

/// Evaluate the manuscript and rewrite it once if it scores below the gate.
pub async fn review_manuscript(
    client: &ProviderClient,
    req: &RunRequest,
    manuscript: Manuscript,
    gate: QualityGate,
    fact_check_enabled: bool,
) -> Result<ReviewOutcome, StageError> {
    if validate_manuscript(&manuscript) != Verdict::Accept {
        return Err(StageError::invalid_input(
            Stage::Review,
            "manuscript is empty",
        ));
    }

    let evaluated = run_with_correction(
        client,
        Stage::Review,
        Task::ScriptReviewEvaluate,
        &review_prompt(req, &manuscript),
        validate_review,
    )
    .await?;
    let mut warnings = evaluated.warnings;
    let review = evaluated.value;
    let decision = gate.decide(&review);
    info!(
        stage = "review",
        score = review.score,
        threshold = gate.threshold,
        decision = ?decision,
        "manuscript evaluated"
    );

    let manuscript = match decision {
        GateDecision::Accepted => manuscript,
        GateDecision::Rewritten => {
            let rewritten = run_with_correction(
                client,
                Stage::Review,
                Task::ScriptReviewRewrite,
                &rewrite_prompt(req, &manuscript, &review),
                validate_manuscript,
            )
            .await?;
            warnings.extend(rewritten.warnings);
            let mut replacement = rewritten.value;
            if replacement.title.trim().is_empty() {
                replacement.title = manuscript.title;
            }
            info!(
                stage = "review",
                sections = replacement.sections.len(),
                words = replacement.word_count(),
                "manuscript rewritten"
            );
            replacement
        }
    };

    let (manuscript, fact_patches) = if fact_check_enabled {
        match fact_check(client, req, &manuscript).await {
            Ok((patched, applied)) => {
                info!(stage = "review", patches = applied, "fact check applied");
                (patched, applied)
            }
            Err(reason) => {
                warn!(stage = "review", %reason, "fact check skipped");
                warnings.push(format!("fact check skipped: {reason}"));
                (manuscript, 0)
            }
        }
    } else {
        (manuscript, 0)
    };

    Ok(ReviewOutcome {
        manuscript,
        review,
        decision,
        fact_patches,
        warnings,
    })
}
