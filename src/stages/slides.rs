use serde::Deserialize;
use tracing::info;

use crate::client::ProviderClient;
use crate::prompts::slides_prompt;
use crate::router::Task;
use crate::targets::PresentationTargets;
use crate::types::{Manuscript, RunRequest, Slide};

use super::{run_with_correction, Stage, StageError, StageOutput, Verdict};

/// Wire shape of the slides reply.
#[derive(Debug, Clone, Deserialize)]
pub struct SlideList {
    #[serde(default)]
    pub slides: Vec<Slide>,
}

fn validate_slides(list: &SlideList, targets: &PresentationTargets) -> Verdict {
    if list.slides.is_empty() {
        return Verdict::Reject("no slides".to_string());
    }
    if let Some(idx) = list.slides.iter().position(|s| s.title.trim().is_empty()) {
        return Verdict::Reject(format!("slide {} has an empty title", idx + 1));
    }
    if !targets.slide_count_ok(list.slides.len()) {
        return Verdict::Adjust(format!(
            "slide count {} is outside the required range {}-{}",
            list.slides.len(),
            targets.min_slides,
            targets.max_slides
        ));
    }
    Verdict::Accept
}

/// Slides carry only what the model is allowed to decide here; numbering is
/// positional and the later enrichment fields start empty.
fn normalize(slides: Vec<Slide>) -> Vec<Slide> {
    slides
        .into_iter()
        .enumerate()
        .map(|(idx, slide)| {
            let image_query = slide.wants_image().map(str::to_string);
            Slide {
                slide_number: idx as u32 + 1,
                title: slide.title.trim().to_string(),
                bullet_points: slide
                    .bullet_points
                    .into_iter()
                    .map(|b| b.trim().to_string())
                    .filter(|b| !b.is_empty())
                    .collect(),
                image_query,
                image_url: None,
                speaker_notes: None,
            }
        })
        .collect()
}

/// Manuscript → audience-facing slides. Slide count and order are fixed from
/// here on.
pub async fn generate_slides(
    client: &ProviderClient,
    req: &RunRequest,
    manuscript: &Manuscript,
    targets: &PresentationTargets,
) -> Result<StageOutput<Vec<Slide>>, StageError> {
    if manuscript.sections.is_empty() {
        return Err(StageError::invalid_input(
            Stage::Slides,
            "manuscript has no sections",
        ));
    }

    let prompt = slides_prompt(req, manuscript, targets);
    let output = run_with_correction(client, Stage::Slides, Task::Slides, &prompt, |list: &SlideList| {
        validate_slides(list, targets)
    })
    .await?
    .map(|list| normalize(list.slides));

    info!(
        stage = "slides",
        slides = output.value.len(),
        with_image_query = output.value.iter().filter(|s| s.wants_image().is_some()).count(),
        "slides ready"
    );
    Ok(output)
}
