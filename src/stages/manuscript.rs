use tracing::info;

use crate::client::ProviderClient;
use crate::prompts::manuscript_prompt;
use crate::router::Task;
use crate::targets::PresentationTargets;
use crate::types::{Manuscript, Outline, RunRequest};

use super::{run_with_correction, Stage, StageError, StageOutput, Verdict};

pub(super) fn validate_manuscript(manuscript: &Manuscript) -> Verdict {
    if manuscript.sections.is_empty() {
        return Verdict::Reject("manuscript has no sections".to_string());
    }
    if let Some(idx) = manuscript
        .sections
        .iter()
        .position(|s| s.content.trim().is_empty())
    {
        return Verdict::Reject(format!("manuscript section {} has no content", idx + 1));
    }
    Verdict::Accept
}

/// Outline → spoken manuscript.
pub async fn generate_manuscript(
    client: &ProviderClient,
    req: &RunRequest,
    outline: &Outline,
    targets: &PresentationTargets,
) -> Result<StageOutput<Manuscript>, StageError> {
    if outline.sections.is_empty() {
        return Err(StageError::invalid_input(
            Stage::Manuscript,
            "outline has no sections",
        ));
    }

    let prompt = manuscript_prompt(req, outline, targets);
    let mut output = run_with_correction(
        client,
        Stage::Manuscript,
        Task::Manuscript,
        &prompt,
        validate_manuscript,
    )
    .await?;
    if output.value.title.trim().is_empty() {
        output.value.title = outline.title.clone();
    }
    info!(
        stage = "manuscript",
        sections = output.value.sections.len(),
        words = output.value.word_count(),
        target_words = targets.target_word_count,
        "manuscript ready"
    );
    Ok(output)
}
