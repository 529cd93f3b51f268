//! Data model for a deck run: the request, every stage's output, and the
//! final result.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const MAX_DURATION_MINUTES: u32 = 120;

// =============================================================================
// Request
// =============================================================================

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("duration_minutes must be in [1,{MAX_DURATION_MINUTES}], got {0}")]
    Duration(u32),
    #[error("speaker age must be in [1,120], got {0}")]
    SpeakerAge(u32),
}

/// Who delivers the talk. Adapts tone only, never content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerProfile {
    pub age: u32,
    #[serde(default)]
    pub role: Option<String>,
    /// Free text; "expert" is the only value with pacing effects.
    #[serde(default)]
    pub experience_level: Option<String>,
}

impl SpeakerProfile {
    pub fn is_expert(&self) -> bool {
        self.experience_level
            .as_deref()
            .is_some_and(|lvl| lvl.trim().eq_ignore_ascii_case("expert"))
    }
}

/// The brief a run is built from. Immutable once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub topic: String,
    pub duration_minutes: u32,
    pub audience: String,
    pub language: String,
    #[serde(default)]
    pub speaker_profile: Option<SpeakerProfile>,
    #[serde(default)]
    pub theme: Theme,
}

impl RunRequest {
    pub fn new(
        topic: impl Into<String>,
        duration_minutes: u32,
        audience: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            duration_minutes,
            audience: audience.into(),
            language: language.into(),
            speaker_profile: None,
            theme: Theme::default(),
        }
    }

    pub fn with_speaker(mut self, profile: SpeakerProfile) -> Self {
        self.speaker_profile = Some(profile);
        self
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.topic.trim().is_empty() {
            return Err(RequestError::Empty("topic"));
        }
        if self.audience.trim().is_empty() {
            return Err(RequestError::Empty("audience"));
        }
        if self.language.trim().is_empty() {
            return Err(RequestError::Empty("language"));
        }
        if self.duration_minutes == 0 || self.duration_minutes > MAX_DURATION_MINUTES {
            return Err(RequestError::Duration(self.duration_minutes));
        }
        if let Some(profile) = &self.speaker_profile {
            if profile.age == 0 || profile.age > 120 {
                return Err(RequestError::SpeakerAge(profile.age));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Outline
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Introduction,
    #[default]
    Main,
    Conclusion,
}

impl SectionKind {
    /// Lenient parse: case and whitespace are ignored, anything unknown is `Main`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "introduction" | "intro" => SectionKind::Introduction,
            "conclusion" => SectionKind::Conclusion,
            _ => SectionKind::Main,
        }
    }
}

fn de_section_kind<'de, D>(deserializer: D) -> Result<SectionKind, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .map(SectionKind::parse_lenient)
        .unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    #[serde(rename = "type", default, deserialize_with = "de_section_kind")]
    pub kind: SectionKind,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "key_points")]
    pub points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<OutlineSection>,
}

// =============================================================================
// Manuscript
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManuscriptSection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
}

/// The spoken script, one prose block per outline section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manuscript {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<ManuscriptSection>,
}

impl Manuscript {
    pub fn full_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn word_count(&self) -> usize {
        self.sections
            .iter()
            .map(|s| s.content.split_whitespace().count())
            .sum()
    }
}

// =============================================================================
// Review
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub score: u8,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub missing_topics: Vec<String>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
}

// =============================================================================
// Slides
// =============================================================================

/// One slide. Enrichment stages only ever fill the optional fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    #[serde(default)]
    pub slide_number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub bullet_points: Vec<String>,
    #[serde(default)]
    pub image_query: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub speaker_notes: Option<String>,
}

impl Slide {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Trimmed image query, if the slide asks for an image at all.
    pub fn wants_image(&self) -> Option<&str> {
        self.image_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

// =============================================================================
// Images
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
    /// Provider rank, 1-based. Lower is better.
    pub rank: usize,
    pub width: u32,
    pub height: u32,
}

impl ImageCandidate {
    pub fn is_landscape(&self) -> bool {
        self.width >= self.height
    }
}

/// Vision model verdict on one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageScore {
    pub score: f64,
    pub safe: bool,
    #[serde(default)]
    pub reason: String,
}

// =============================================================================
// Themes
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Theme {
    #[default]
    LightProfessional,
    DarkTech,
    CorporateBlue,
    MinimalClean,
    BoldGradient,
}

/// Palette handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThemeStyle {
    pub name: &'static str,
    pub background: [u8; 3],
    pub primary: [u8; 3],
    pub secondary: [u8; 3],
    pub accent: [u8; 3],
    pub gradient: Option<([u8; 3], [u8; 3])>,
}

impl Theme {
    pub const ALL: [Theme; 5] = [
        Theme::LightProfessional,
        Theme::DarkTech,
        Theme::CorporateBlue,
        Theme::MinimalClean,
        Theme::BoldGradient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::LightProfessional => "LIGHT_PROFESSIONAL",
            Theme::DarkTech => "DARK_TECH",
            Theme::CorporateBlue => "CORPORATE_BLUE",
            Theme::MinimalClean => "MINIMAL_CLEAN",
            Theme::BoldGradient => "BOLD_GRADIENT",
        }
    }

    /// Case-insensitive; unknown or empty names give the default theme.
    pub fn parse_or_default(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    pub fn style(&self) -> ThemeStyle {
        match self {
            Theme::LightProfessional => ThemeStyle {
                name: "Light Professional",
                background: [247, 249, 252],
                primary: [15, 23, 42],
                secondary: [100, 116, 139],
                accent: [37, 99, 235],
                gradient: None,
            },
            Theme::DarkTech => ThemeStyle {
                name: "Dark Tech",
                background: [15, 23, 42],
                primary: [248, 250, 252],
                secondary: [148, 163, 184],
                accent: [56, 189, 248],
                gradient: None,
            },
            Theme::CorporateBlue => ThemeStyle {
                name: "Corporate Blue",
                background: [255, 255, 255],
                primary: [1, 47, 105],
                secondary: [70, 98, 132],
                accent: [0, 84, 159],
                gradient: None,
            },
            Theme::MinimalClean => ThemeStyle {
                name: "Minimal Clean",
                background: [255, 255, 255],
                primary: [23, 23, 23],
                secondary: [115, 115, 115],
                accent: [163, 163, 163],
                gradient: None,
            },
            Theme::BoldGradient => ThemeStyle {
                name: "Bold Gradient",
                background: [250, 250, 255],
                primary: [15, 23, 42],
                secondary: [71, 85, 105],
                accent: [99, 102, 241],
                gradient: Some(([99, 102, 241], [168, 85, 247])),
            },
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Theme::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == key)
            .ok_or_else(|| format!("unknown theme: {s}"))
    }
}

// =============================================================================
// Result
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub output_path: PathBuf,
    pub script_path: Option<PathBuf>,
    pub slide_count: usize,
    pub images_included: usize,
    /// Slides that asked for an image and did not get one.
    pub images_missing: usize,
    pub warnings: Vec<String>,
    pub review_score: u8,
    pub rewritten: bool,
    pub provider_calls: u64,
    pub cost_nanodollars: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_blank_fields_and_bad_durations() {
        assert!(RunRequest::new("Solar power", 10, "students", "en")
            .validate()
            .is_ok());
        assert_eq!(
            RunRequest::new("  ", 10, "students", "en").validate(),
            Err(RequestError::Empty("topic"))
        );
        assert_eq!(
            RunRequest::new("t", 0, "students", "en").validate(),
            Err(RequestError::Duration(0))
        );
        assert_eq!(
            RunRequest::new("t", 121, "students", "en").validate(),
            Err(RequestError::Duration(121))
        );
        let req = RunRequest::new("t", 5, "a", "en").with_speaker(SpeakerProfile {
            age: 0,
            role: None,
            experience_level: None,
        });
        assert_eq!(req.validate(), Err(RequestError::SpeakerAge(0)));
    }

    #[test]
    fn outline_sections_accept_key_points_and_loose_types() {
        let outline: Outline = serde_json::from_str(
            r#"{"title":"T","sections":[
                {"type":" Introduction ","title":"Hi","key_points":["a","b"]},
                {"title":"Body","points":["c"]},
                {"type":null,"title":"Also body"},
                {"type":"CONCLUSION","title":"Bye","points":[]}
            ]}"#,
        )
        .unwrap();
        let kinds: Vec<_> = outline.sections.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::Introduction,
                SectionKind::Main,
                SectionKind::Main,
                SectionKind::Conclusion
            ]
        );
        assert_eq!(outline.sections[0].points, vec!["a", "b"]);
    }

    #[test]
    fn themes_parse_case_insensitively_with_fallback() {
        assert_eq!(Theme::parse_or_default("dark_tech"), Theme::DarkTech);
        assert_eq!(Theme::parse_or_default("bold-gradient"), Theme::BoldGradient);
        assert_eq!(Theme::parse_or_default("neon"), Theme::LightProfessional);
        assert_eq!(Theme::parse_or_default(""), Theme::LightProfessional);
        assert!(Theme::BoldGradient.style().gradient.is_some());
    }

    #[test]
    fn slide_image_query_is_trimmed_and_blank_is_absent() {
        let mut slide = Slide::new("Growth");
        assert_eq!(slide.wants_image(), None);
        slide.image_query = Some("   ".into());
        assert_eq!(slide.wants_image(), None);
        slide.image_query = Some(" growth chart ".into());
        assert_eq!(slide.wants_image(), Some("growth chart"));
    }

    #[test]
    fn manuscript_counts_words_across_sections() {
        let m = Manuscript {
            title: "T".into(),
            sections: vec![
                ManuscriptSection {
                    name: "Intro".into(),
                    content: "one two three".into(),
                },
                ManuscriptSection {
                    name: "End".into(),
                    content: "four  five".into(),
                },
            ],
        };
        assert_eq!(m.word_count(), 5);
        assert_eq!(m.full_text(), "one two three\n\nfour  five");
    }
}
