//! Rendering handoff: the finished slide list becomes a document on disk.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::types::{Manuscript, Slide, Theme, ThemeStyle};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("nothing to render: {0}")]
    Empty(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RenderError + '_ {
    move |source| RenderError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeckMetadata {
    pub run_id: Uuid,
    pub title: String,
    pub topic: String,
    pub audience: String,
    pub language: String,
    pub duration_minutes: u32,
    pub theme: Theme,
    pub generated_at: DateTime<Utc>,
}

/// Turns the in-memory deck into a document. Returns the written path.
pub trait DeckRenderer: Send + Sync {
    fn render(&self, slides: &[Slide], meta: &DeckMetadata, out: &Path)
        -> Result<PathBuf, RenderError>;
}

#[derive(Serialize)]
struct DeckDocument<'a> {
    metadata: &'a DeckMetadata,
    style: ThemeStyle,
    slides: &'a [Slide],
}

/// Writes the deck as pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDeckRenderer;

impl DeckRenderer for JsonDeckRenderer {
    fn render(
        &self,
        slides: &[Slide],
        meta: &DeckMetadata,
        out: &Path,
    ) -> Result<PathBuf, RenderError> {
        if slides.is_empty() {
            return Err(RenderError::Empty("deck has no slides".to_string()));
        }
        ensure_parent(out)?;
        let doc = DeckDocument {
            metadata: meta,
            style: meta.theme.style(),
            slides,
        };
        let body = serde_json::to_string_pretty(&doc)?;
        std::fs::write(out, body).map_err(io_err(out))?;
        Ok(out.to_path_buf())
    }
}

fn ensure_parent(path: &Path) -> Result<(), RenderError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(io_err(parent))
        }
        _ => Ok(()),
    }
}

/// `<dir>/<stem>_script.md` next to the deck.
pub fn script_path_for(deck_path: &Path) -> PathBuf {
    let stem = deck_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("presentation");
    deck_path.with_file_name(format!("{stem}_script.md"))
}

/// Write the spoken manuscript as Markdown next to the deck.
pub fn export_manuscript_markdown(
    manuscript: &Manuscript,
    meta: &DeckMetadata,
    deck_path: &Path,
) -> Result<PathBuf, RenderError> {
    let path = script_path_for(deck_path);
    ensure_parent(&path)?;

    let mut doc = format!(
        "# {}\n\n_Topic: {} · Duration: {} min · Audience: {}_\n",
        manuscript.title, meta.topic, meta.duration_minutes, meta.audience
    );
    for section in &manuscript.sections {
        doc.push_str(&format!("\n## {}\n\n{}\n", section.name, section.content.trim()));
    }
    std::fs::write(&path, doc).map_err(io_err(&path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ManuscriptSection;

    fn meta() -> DeckMetadata {
        DeckMetadata {
            run_id: Uuid::nil(),
            title: "Solar".into(),
            topic: "Solar power".into(),
            audience: "students".into(),
            language: "en".into(),
            duration_minutes: 5,
            theme: Theme::DarkTech,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn script_path_sits_next_to_deck() {
        assert_eq!(
            script_path_for(Path::new("out/talk.json")),
            PathBuf::from("out/talk_script.md")
        );
    }

    #[test]
    fn json_renderer_writes_metadata_and_slides() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/deck.json");
        let slides = vec![Slide::new("One"), Slide::new("Two")];

        let written = JsonDeckRenderer.render(&slides, &meta(), &out).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
        assert_eq!(value["metadata"]["theme"], "DARK_TECH");
        assert_eq!(value["style"]["name"], "Dark Tech");
        assert_eq!(value["slides"][1]["title"], "Two");
    }

    #[test]
    fn empty_decks_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonDeckRenderer
            .render(&[], &meta(), &dir.path().join("d.json"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Empty(_)));
    }

    #[test]
    fn manuscript_export_writes_sections_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let manuscript = Manuscript {
            title: "Solar".into(),
            sections: vec![
                ManuscriptSection {
                    name: "Introduction".into(),
                    content: "Hello.".into(),
                },
                ManuscriptSection {
                    name: "Conclusion".into(),
                    content: "Bye.".into(),
                },
            ],
        };
        let path =
            export_manuscript_markdown(&manuscript, &meta(), &dir.path().join("deck.json")).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let intro = text.find("## Introduction").unwrap();
        let outro = text.find("## Conclusion").unwrap();
        assert!(intro < outro);
        assert!(text.starts_with("# Solar"));
    }
}
