use std::collections::HashMap;

use serde::Deserialize;
use tracing::info;

use crate::client::ProviderClient;
use crate::prompts::notes_prompt;
use crate::router::Task;
use crate::types::{Manuscript, Slide};

use super::{run_with_correction, Stage, StageError, StageOutput, Verdict};

#[derive(Debug, Clone, Deserialize)]
pub struct SlideNote {
    pub slide_number: u32,
    #[serde(default)]
    pub speaker_notes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotesList {
    #[serde(default)]
    pub notes: Vec<SlideNote>,
}

impl NotesList {
    fn by_slide(&self) -> HashMap<u32, &str> {
        self.notes
            .iter()
            .map(|n| (n.slide_number, n.speaker_notes.trim()))
            .filter(|(_, text)| !text.is_empty())
            .collect()
    }
}

fn validate_notes(list: &NotesList, slides: &[Slide]) -> Verdict {
    let by_slide = list.by_slide();
    let (covered, missing): (Vec<&Slide>, Vec<&Slide>) = slides
        .iter()
        .partition(|s| by_slide.contains_key(&s.slide_number));
    if covered.is_empty() {
        return Verdict::Reject("no speaker notes for any slide".to_string());
    }
    if missing.is_empty() {
        Verdict::Accept
    } else {
        let numbers: Vec<String> = missing.iter().map(|s| s.slide_number.to_string()).collect();
        Verdict::Adjust(format!("speaker notes missing for slides {}", numbers.join(", ")))
    }
}

/// Attach notes by slide number. Count and order of `slides` never change;
/// notes for unknown slide numbers are dropped.
pub fn merge_notes(slides: Vec<Slide>, list: &NotesList) -> Vec<Slide> {
    let by_slide = list.by_slide();
    slides
        .into_iter()
        .map(|mut slide| {
            if let Some(text) = by_slide.get(&slide.slide_number) {
                slide.speaker_notes = Some(text.to_string());
            }
            slide
        })
        .collect()
}

/// Slides + manuscript → slides with speaker notes.
pub async fn add_speaker_notes(
    client: &ProviderClient,
    manuscript: &Manuscript,
    slides: Vec<Slide>,
) -> Result<StageOutput<Vec<Slide>>, StageError> {
    if slides.is_empty() {
        return Err(StageError::invalid_input(Stage::Notes, "no slides"));
    }
    if manuscript.sections.is_empty() {
        return Err(StageError::invalid_input(
            Stage::Notes,
            "manuscript has no sections",
        ));
    }

    let prompt = notes_prompt(manuscript, &slides);
    let output = run_with_correction(client, Stage::Notes, Task::Notes, &prompt, |list: &NotesList| {
        validate_notes(list, &slides)
    })
    .await?;

    let merged = output.map(|list| merge_notes(slides, &list));
    info!(
        stage = "notes",
        slides = merged.value.len(),
        with_notes = merged.value.iter().filter(|s| s.speaker_notes.is_some()).count(),
        "speaker notes ready"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slides(n: u32) -> Vec<Slide> {
        (1..=n)
            .map(|i| Slide {
                slide_number: i,
                ..Slide::new(format!("S{i}"))
            })
            .collect()
    }

    fn notes(pairs: &[(u32, &str)]) -> NotesList {
        NotesList {
            notes: pairs
                .iter()
                .map(|(n, t)| SlideNote {
                    slide_number: *n,
                    speaker_notes: t.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn missing_notes_are_soft_and_empty_is_hard() {
        let s = slides(3);
        assert_eq!(
            validate_notes(&notes(&[(1, "a"), (2, "b"), (3, "c")]), &s),
            Verdict::Accept
        );
        assert_eq!(
            validate_notes(&notes(&[(1, "a"), (3, " ")]), &s),
            Verdict::Adjust("speaker notes missing for slides 2, 3".to_string())
        );
        assert!(matches!(validate_notes(&notes(&[]), &s), Verdict::Reject(_)));
    }

    #[test]
    fn notes_for_unknown_slides_only_are_rejected() {
        let s = slides(3);
        assert_eq!(
            validate_notes(&notes(&[(9, "stray"), (0, "also stray")]), &s),
            Verdict::Reject("no speaker notes for any slide".to_string())
        );
        assert_eq!(
            validate_notes(&notes(&[(9, "stray"), (2, "b")]), &s),
            Verdict::Adjust("speaker notes missing for slides 1, 3".to_string())
        );
    }

    #[test]
    fn merge_keeps_slide_order_and_ignores_strays() {
        let merged = merge_notes(slides(3), &notes(&[(3, "c"), (1, " a "), (9, "stray")]));
        let numbers: Vec<u32> = merged.iter().map(|s| s.slide_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(merged[0].speaker_notes.as_deref(), Some("a"));
        assert_eq!(merged[1].speaker_notes, None);
        assert_eq!(merged[2].speaker_notes.as_deref(), Some("c"));
    }
}
