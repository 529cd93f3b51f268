use tracing::info;

use crate::client::ProviderClient;
use crate::prompts::outline_prompt;
use crate::router::Task;
use crate::targets::PresentationTargets;
use crate::types::{Outline, RunRequest};

use super::{run_with_correction, Stage, StageError, StageOutput, Verdict};

fn validate_outline(outline: &Outline) -> Verdict {
    if outline.title.trim().is_empty() {
        return Verdict::Reject("outline title is empty".to_string());
    }
    if outline.sections.is_empty() {
        return Verdict::Reject("outline has no sections".to_string());
    }
    if let Some(idx) = outline.sections.iter().position(|s| s.title.trim().is_empty()) {
        return Verdict::Reject(format!("section {} has an empty title", idx + 1));
    }
    Verdict::Accept
}

/// Brief → outline.
pub async fn generate_outline(
    client: &ProviderClient,
    req: &RunRequest,
    targets: &PresentationTargets,
) -> Result<StageOutput<Outline>, StageError> {
    if req.topic.trim().is_empty() {
        return Err(StageError::invalid_input(Stage::Outline, "topic is empty"));
    }

    let prompt = outline_prompt(req, targets);
    let output = run_with_correction(client, Stage::Outline, Task::Outline, &prompt, validate_outline)
        .await?;
    info!(
        stage = "outline",
        sections = output.value.sections.len(),
        title = %output.value.title,
        "outline ready"
    );
    Ok(output)
}
