//! Stage runners.
//!
//! Every stage is one logical provider call with a typed output and a
//! validator. [`run_with_correction`] owns the shared retry rules: at most one
//! extra attempt, with a corrective instruction when the previous reply was
//! malformed or rejected, or with the same prompt after a transient failure.

mod manuscript;
mod notes;
mod outline;
mod review;
mod slides;

use std::fmt;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::client::ProviderClient;
use crate::gateway::{ProviderError, ProviderErrorKind};
use crate::prompts::PromptInstance;
use crate::router::Task;

pub use manuscript::generate_manuscript;
pub use notes::{add_speaker_notes, merge_notes, NotesList, SlideNote};
pub use outline::generate_outline;
pub use review::{
    apply_patches, review_manuscript, FactCheckIssue, FactCheckReport, GateDecision,
    QualityGate, ReviewOutcome,
};
pub use slides::{generate_slides, SlideList};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Outline,
    Manuscript,
    Review,
    Slides,
    Notes,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Outline => "outline",
            Stage::Manuscript => "manuscript",
            Stage::Review => "review",
            Stage::Slides => "slides",
            Stage::Notes => "notes",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageErrorKind {
    InvalidInput,
    InvalidOutput,
    ProviderFailure,
}

impl StageErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageErrorKind::InvalidInput => "invalid_input",
            StageErrorKind::InvalidOutput => "invalid_output",
            StageErrorKind::ProviderFailure => "provider_failure",
        }
    }
}

impl fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed ({kind}): {cause}")]
pub struct StageError {
    pub stage: Stage,
    pub kind: StageErrorKind,
    pub cause: String,
    #[source]
    pub provider: Option<ProviderError>,
}

impl StageError {
    pub fn invalid_input(stage: Stage, cause: impl Into<String>) -> Self {
        Self {
            stage,
            kind: StageErrorKind::InvalidInput,
            cause: cause.into(),
            provider: None,
        }
    }

    pub fn invalid_output(stage: Stage, cause: impl Into<String>) -> Self {
        Self {
            stage,
            kind: StageErrorKind::InvalidOutput,
            cause: cause.into(),
            provider: None,
        }
    }

    pub fn provider_failure(stage: Stage, err: ProviderError) -> Self {
        Self {
            stage,
            kind: StageErrorKind::ProviderFailure,
            cause: err.to_string(),
            provider: Some(err),
        }
    }
}

// =============================================================================
// Runner
// =============================================================================

/// Validator outcome for one structured reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Usable, but worth one corrective retry.
    Adjust(String),
    Reject(String),
}

/// A validated stage output plus any soft problems it was accepted with.
#[derive(Debug, Clone)]
pub struct StageOutput<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> StageOutput<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    fn with_warning(value: T, stage: Stage, reason: &str) -> Self {
        Self {
            value,
            warnings: vec![format!("{stage}: {reason}")],
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutput<U> {
        StageOutput {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

/// One logical call with the single-retry policy.
///
/// | first attempt          | second attempt prompt      |
/// |------------------------|----------------------------|
/// | accepted               | none                       |
/// | adjust / reject        | prompt + correction        |
/// | malformed reply        | prompt + correction        |
/// | transient error        | same prompt                |
/// | other permanent error  | none, `provider_failure`   |
///
/// An adjust-grade first reply is kept as a fallback if the retry does no
/// better.
pub async fn run_with_correction<T, F>(
    client: &ProviderClient,
    stage: Stage,
    task: Task,
    prompt: &PromptInstance,
    validate: F,
) -> Result<StageOutput<T>, StageError>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Verdict,
{
    let mut fallback: Option<(T, String)> = None;

    let retry_prompt = match client.call_structured::<T>(task, prompt).await {
        Ok(value) => match validate(&value) {
            Verdict::Accept => return Ok(StageOutput::clean(value)),
            Verdict::Adjust(reason) => {
                warn!(stage = stage.as_str(), %reason, "output needs adjustment, retrying");
                let corrected = prompt.with_correction(&reason);
                fallback = Some((value, reason));
                corrected
            }
            Verdict::Reject(reason) => {
                warn!(stage = stage.as_str(), %reason, "output rejected, retrying");
                prompt.with_correction(&reason)
            }
        },
        Err(err) if err.is_schema_failure() => {
            warn!(stage = stage.as_str(), error = %err, "malformed output, retrying");
            prompt.with_correction(&err.to_string())
        }
        Err(err) if err.kind() == ProviderErrorKind::Transient => {
            warn!(stage = stage.as_str(), error = %err, "transient provider error, retrying");
            prompt.clone()
        }
        Err(err) => return Err(StageError::provider_failure(stage, err)),
    };

    match client.call_structured::<T>(task, &retry_prompt).await {
        Ok(value) => match validate(&value) {
            Verdict::Accept => Ok(StageOutput::clean(value)),
            Verdict::Adjust(reason) => Ok(StageOutput::with_warning(value, stage, &reason)),
            Verdict::Reject(reason) => match fallback {
                Some((value, first_reason)) => {
                    Ok(StageOutput::with_warning(value, stage, &first_reason))
                }
                None => Err(StageError::invalid_output(stage, reason)),
            },
        },
        Err(err) => match fallback {
            Some((value, first_reason)) => {
                warn!(stage = stage.as_str(), error = %err, "retry failed, keeping first output");
                Ok(StageOutput::with_warning(value, stage, &first_reason))
            }
            None if err.is_schema_failure() => {
                Err(StageError::invalid_output(stage, err.to_string()))
            }
            None => Err(StageError::provider_failure(stage, err)),
        },
    }
}
