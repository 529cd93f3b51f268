//! Duration-aware pacing targets: speaking rate, script length, slide range.

use crate::types::{RunRequest, SpeakerProfile};

pub const DEFAULT_WPM: u32 = 135;
/// Students, general public, beginners.
pub const SLOW_WPM: u32 = 125;
/// Experts, engineers, specialists.
pub const FAST_WPM: u32 = 145;

const YOUNG_SPEAKER_MAX_WPM: u32 = 130;
const SENIOR_EXPERT_MIN_WPM: u32 = 140;
const MIN_SLIDES_FLOOR: u32 = 3;

const SLOW_AUDIENCE_TERMS: &[&str] = &[
    "student",
    "general",
    "public",
    "beginner",
    "overview",
    "introductory",
    "everyone",
];

const FAST_AUDIENCE_TERMS: &[&str] = &[
    "expert",
    "technical",
    "engineer",
    "developer",
    "specialist",
    "professional",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationTargets {
    pub wpm: u32,
    pub target_word_count: u32,
    pub min_slides: u32,
    pub max_slides: u32,
}

impl PresentationTargets {
    pub fn for_request(req: &RunRequest) -> Self {
        Self::compute(
            req.duration_minutes,
            &req.audience,
            req.speaker_profile.as_ref(),
        )
    }

    pub fn compute(duration_minutes: u32, audience: &str, speaker: Option<&SpeakerProfile>) -> Self {
        let mut wpm = wpm_for_audience(audience);
        if let Some(speaker) = speaker {
            if speaker.age < 18 {
                wpm = wpm.min(YOUNG_SPEAKER_MAX_WPM);
            } else if speaker.age >= 50 && speaker.is_expert() {
                wpm = wpm.max(SENIOR_EXPERT_MIN_WPM);
            }
        }
        let min_slides = MIN_SLIDES_FLOOR.max(duration_minutes);
        let max_slides = min_slides.max(duration_minutes * 2);
        Self {
            wpm,
            target_word_count: duration_minutes * wpm,
            min_slides,
            max_slides,
        }
    }

    pub fn slide_count_ok(&self, count: usize) -> bool {
        (self.min_slides as usize..=self.max_slides as usize).contains(&count)
    }

    /// Midpoint of the slide range, used to size the outline.
    pub fn target_slides(&self) -> u32 {
        (self.min_slides + self.max_slides) / 2
    }

    /// Main sections the outline should carry for the target slide count.
    pub fn main_section_count(&self) -> u32 {
        ((self.target_slides() * 3) / 4).clamp(2, 8)
    }
}

/// Speaking rate for an audience description. Slow terms win over fast ones.
pub fn wpm_for_audience(audience: &str) -> u32 {
    let lower = audience.trim().to_lowercase();
    if lower.is_empty() {
        return DEFAULT_WPM;
    }
    if SLOW_AUDIENCE_TERMS.iter().any(|t| lower.contains(t)) {
        SLOW_WPM
    } else if FAST_AUDIENCE_TERMS.iter().any(|t| lower.contains(t)) {
        FAST_WPM
    } else {
        DEFAULT_WPM
    }
}
