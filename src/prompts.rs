//! Prompt builders for every generation stage.
//!
//! Builders only assemble text. They never call a provider and never decide
//! retry policy; [`PromptInstance::with_correction`] is the one hook the stage
//! runner uses to ask for a fixed reply.

use crate::gateway::Message;
use crate::targets::PresentationTargets;
use crate::types::{Manuscript, Outline, ReviewResult, RunRequest, Slide};

// =============================================================================
// Prompt instance
// =============================================================================

/// Rendered prompt ready for a provider call.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: &'static str,
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn new(template_slug: &'static str, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            template_slug,
            system: system.into(),
            user: user.into(),
        }
    }

    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }

    /// Same prompt plus an instruction explaining why the last reply was
    /// rejected.
    pub fn with_correction(&self, reason: &str) -> Self {
        let user = format!(
            "{}\n\n<correction>\nYour previous reply was rejected: {}\n\
             Reply again with one JSON object that fixes this and follows the schema exactly.\n\
             </correction>",
            self.user,
            escape_xml_chars(reason.trim())
        );
        Self {
            template_slug: self.template_slug,
            system: self.system.clone(),
            user,
        }
    }

    /// Stable hash of the rendered text, for traces.
    pub fn hash(&self) -> String {
        blake3::hash(format!("{}\n{}", self.system, self.user).as_bytes())
            .to_hex()
            .to_string()
    }
}

/// Escape XML special characters to prevent prompt injection via tag breaking.
fn escape_xml_chars(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn brief_block(req: &RunRequest) -> String {
    format!(
        "<brief>\nTopic: {}\nDuration: {} minutes\nAudience: {}\nLanguage: {}\n</brief>",
        escape_xml_chars(req.topic.trim()),
        req.duration_minutes,
        escape_xml_chars(req.audience.trim()),
        escape_xml_chars(req.language.trim()),
    )
}

fn manuscript_block(manuscript: &Manuscript) -> String {
    let body = manuscript
        .sections
        .iter()
        .map(|s| format!("## {}\n{}", s.name, s.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Title: {}\n\n{}", manuscript.title, body)
}

// =============================================================================
// Outline
// =============================================================================

const OUTLINE_SYSTEM: &str = "You are an expert presentation designer. \
Produce a clear outline with a logical narrative: introduction, main sections, conclusion. \
Reply with a single JSON object and nothing else.";

pub fn outline_prompt(req: &RunRequest, targets: &PresentationTargets) -> PromptInstance {
    let user = format!(
        "{brief}\n\n\
         Create a presentation outline.\n\
         - One \"introduction\" section: hook, context, purpose.\n\
         - {mains} \"main\" sections, one core idea each with 2-4 points.\n\
         - One \"conclusion\" section: summary and final takeaway.\n\
         The outline must support {min}-{max} slides for a {duration}-minute talk. \
         Adapt depth and terminology to the audience.\n\n\
         Schema:\n\
         {{\"title\": string, \"sections\": [{{\"type\": \"introduction\"|\"main\"|\"conclusion\", \
         \"title\": string, \"points\": [string]}}]}}",
        brief = brief_block(req),
        mains = targets.main_section_count(),
        min = targets.min_slides,
        max = targets.max_slides,
        duration = req.duration_minutes,
    );
    PromptInstance::new("outline", OUTLINE_SYSTEM, user)
}

// =============================================================================
// Manuscript
// =============================================================================

const MANUSCRIPT_SYSTEM: &str = "You are an expert writer of spoken presentation scripts. \
The presenter will read your text aloud: full sentences, natural paragraphs, smooth transitions, \
no bullet points. When adapting to a speaker profile, change only language and tone, never facts. \
Reply with a single JSON object and nothing else.";

/// Tone instruction for the speaker profile. Style only.
fn speaker_instruction(req: &RunRequest) -> String {
    let Some(profile) = &req.speaker_profile else {
        return "Speaker: no profile given; use a neutral, clear, professional adult tone.".to_string();
    };
    let style = match profile.age {
        0..=17 => "Use simple sentences and everyday vocabulary with little jargon.",
        18..=29 => "Use a natural, modern tone with moderate complexity.",
        30..=49 => "Use clear professional language with moderate formality.",
        _ => "Use precise terminology and concise phrasing.",
    };
    let mut parts = vec![format!("Speaker profile: age {}.", profile.age), style.to_string()];
    if let Some(role) = profile.role.as_deref().filter(|r| !r.trim().is_empty()) {
        parts.push(format!("Role: {}.", escape_xml_chars(role.trim())));
    }
    if let Some(level) = profile.experience_level.as_deref().filter(|l| !l.trim().is_empty()) {
        parts.push(format!("Experience level: {}.", escape_xml_chars(level.trim())));
    }
    parts.push("Adapt language, tone and complexity only.".to_string());
    parts.join(" ")
}

pub fn manuscript_prompt(
    req: &RunRequest,
    outline: &Outline,
    targets: &PresentationTargets,
) -> PromptInstance {
    let sections = outline
        .sections
        .iter()
        .map(|s| format!("- [{:?}] {}: {}", s.kind, s.title, s.points.join("; ")))
        .collect::<Vec<_>>()
        .join("\n");
    let user = format!(
        "{brief}\n\n{speaker}\n\n\
         Write the full speech manuscript for this outline.\n\
         Title: {title}\n\
         Outline:\n{sections}\n\n\
         Length: roughly {words} words ({wpm} words per minute). \
         Introduction about 10-15%, main body 70-80%, conclusion 10-15%.\n\
         Write one manuscript section per outline section, in outline order.\n\n\
         Schema:\n\
         {{\"title\": string, \"sections\": [{{\"name\": string, \"content\": string}}]}}",
        brief = brief_block(req),
        speaker = speaker_instruction(req),
        title = outline.title,
        words = targets.target_word_count,
        wpm = targets.wpm,
    );
    PromptInstance::new("manuscript", MANUSCRIPT_SYSTEM, user)
}

// =============================================================================
// Review, rewrite, fact check
// =============================================================================

const REVIEW_SYSTEM: &str = "You are an expert presentation reviewer. \
Judge the text as a spoken manuscript that will be read aloud. \
Reply with a single JSON object and nothing else.";

pub fn review_prompt(req: &RunRequest, manuscript: &Manuscript) -> PromptInstance {
    let user = format!(
        "{brief}\n\n<manuscript>\n{body}\n</manuscript>\n\n\
         Evaluate structure and flow, clarity when spoken, audience fit, depth, \
         engagement, fit to the duration, transitions, and absence of outline-like phrasing.\n\n\
         Schema:\n\
         {{\"score\": integer 0-10, \"strengths\": [string], \"weaknesses\": [string], \
         \"missing_topics\": [string], \"improvement_suggestions\": [string]}}",
        brief = brief_block(req),
        body = manuscript_block(manuscript),
    );
    PromptInstance::new("script_review_evaluate", REVIEW_SYSTEM, user)
}

const REWRITE_SYSTEM: &str = "You are an expert presentation writer. \
Improve the spoken manuscript using the reviewer feedback. Keep continuous prose, no bullet points. \
Reply with a single JSON object and nothing else.";

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {}", i.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn rewrite_prompt(
    req: &RunRequest,
    manuscript: &Manuscript,
    review: &ReviewResult,
) -> PromptInstance {
    let user = format!(
        "{brief}\n\n<manuscript>\n{body}\n</manuscript>\n\n\
         Reviewer score: {score}/10\n\
         Weaknesses:\n{weak}\n\
         Missing topics:\n{missing}\n\
         Suggestions:\n{suggest}\n\n\
         Rewrite the manuscript: fix the weaknesses, cover missing topics where relevant, \
         keep the topic, duration, language and section structure.\n\n\
         Schema:\n\
         {{\"title\": string, \"sections\": [{{\"name\": string, \"content\": string}}]}}",
        brief = brief_block(req),
        body = manuscript_block(manuscript),
        score = review.score,
        weak = bullet_list(&review.weaknesses),
        missing = bullet_list(&review.missing_topics),
        suggest = bullet_list(&review.improvement_suggestions),
    );
    PromptInstance::new("script_review_rewrite", REWRITE_SYSTEM, user)
}

const FACT_CHECK_SYSTEM: &str = "You are a careful fact-checker for presentation scripts. \
Flag only incorrect, misleading, outdated or unverifiable claims. \
`original_text` must be an exact verbatim quote from the manuscript. \
`corrected_text` must be a minimal replacement in the same tone. \
If unsure, rephrase more cautiously rather than invent figures. \
Reply with a single JSON object and nothing else.";

pub fn fact_check_prompt(req: &RunRequest, manuscript: &Manuscript) -> PromptInstance {
    let user = format!(
        "Topic: {topic}\nAudience: {audience}\n\n\
         Manuscript:\n\n{body}\n\n\
         List factual issues only. If there are none, return {{\"issues\": []}}.\n\n\
         Schema:\n\
         {{\"issues\": [{{\"original_text\": string, \
         \"issue_type\": \"incorrect\"|\"misleading\"|\"outdated\"|\"unverifiable\", \
         \"explanation\": string, \"corrected_text\": string}}]}}",
        topic = req.topic.trim(),
        audience = req.audience.trim(),
        body = manuscript_block(manuscript),
    );
    PromptInstance::new("fact_check", FACT_CHECK_SYSTEM, user)
}

// =============================================================================
// Slides and notes
// =============================================================================

const SLIDES_SYSTEM: &str = "You design visual presentations. Slides are for the audience: \
one core message per slide, short phrases, no full sentences, no speaker notes. \
Reply with a single JSON object and nothing else.";

pub fn slides_prompt(
    req: &RunRequest,
    manuscript: &Manuscript,
    targets: &PresentationTargets,
) -> PromptInstance {
    let user = format!(
        "<manuscript>\n{body}\n</manuscript>\n\n\
         Turn the manuscript into slides.\n\
         Slide count: between {min} and {max} slides for a {duration}-minute talk.\n\
         Each slide: a concise title and 2-4 short bullet phrases.\n\
         image_query: a concrete 2-4 word photo search (\"solar panels factory roof\", not \
         \"sustainability\"), or null for the title slide, the closing slide, agenda slides \
         and text-heavy slides.\n\n\
         Schema:\n\
         {{\"slides\": [{{\"slide_number\": integer, \"title\": string, \
         \"bullet_points\": [string], \"image_query\": string|null}}]}}",
        body = manuscript_block(manuscript),
        min = targets.min_slides,
        max = targets.max_slides,
        duration = req.duration_minutes,
    );
    PromptInstance::new("slides", SLIDES_SYSTEM, user)
}

const NOTES_SYSTEM: &str = "You write presenter support notes. Notes are for the speaker, \
slides are for the audience: 2-5 short reminders per slide, key arguments only, \
never a copy of the bullets. Reply with a single JSON object and nothing else.";

pub fn notes_prompt(manuscript: &Manuscript, slides: &[Slide]) -> PromptInstance {
    let slide_list = slides
        .iter()
        .map(|s| {
            format!(
                "- Slide {}: {} | bullets: {}",
                s.slide_number,
                s.title,
                s.bullet_points.join("; ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let user = format!(
        "<manuscript>\n{body}\n</manuscript>\n\n\
         Slides:\n{slide_list}\n\n\
         Write speaker notes for every slide, matched to the manuscript passage it covers.\n\n\
         Schema:\n\
         {{\"notes\": [{{\"slide_number\": integer, \"speaker_notes\": string}}]}}",
        body = manuscript_block(manuscript),
    );
    PromptInstance::new("notes", NOTES_SYSTEM, user)
}

// =============================================================================
// Vision
// =============================================================================

pub const VISION_SYSTEM: &str = "You rate photos for professional presentation slides. \
Reply with a single JSON object and nothing else.";

/// Text half of a vision scoring request; the image travels as a separate part.
pub fn vision_prompt(slide_context: &str) -> String {
    format!(
        "<slide>\n{}\n</slide>\n\n\
         Rate this image for the slide above: relevance to the topic, clarity of the subject, \
         visual quality, and suitability for a professional audience. Mark it unsafe if it \
         contains violence, nudity, hateful symbols, or anything inappropriate at work.\n\n\
         Schema:\n\
         {{\"score\": number 0-10, \"safe\": boolean, \"reason\": string}}",
        escape_xml_chars(slide_context.trim())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpeakerProfile;

    fn request() -> RunRequest {
        RunRequest::new("Solar <power>", 10, "students", "English")
    }

    #[test]
    fn brief_fields_are_escaped() {
        let targets = PresentationTargets::for_request(&request());
        let prompt = outline_prompt(&request(), &targets);
        assert!(prompt.user.contains("Solar &lt;power&gt;"));
        assert!(prompt.user.contains("10-20 slides"));
    }

    #[test]
    fn correction_appends_reason_and_keeps_system() {
        let base = PromptInstance::new("outline", "sys", "user text");
        let fixed = base.with_correction("missing field `sections`");
        assert_eq!(fixed.system, "sys");
        assert!(fixed.user.starts_with("user text"));
        assert!(fixed.user.contains("missing field `sections`"));
        assert_ne!(base.hash(), fixed.hash());
    }

    #[test]
    fn speaker_profile_only_shapes_tone() {
        let req = request().with_speaker(SpeakerProfile {
            age: 16,
            role: Some("student".into()),
            experience_level: None,
        });
        let instruction = speaker_instruction(&req);
        assert!(instruction.contains("age 16"));
        assert!(instruction.contains("simple sentences"));
        assert!(instruction.contains("Role: student."));
        assert!(speaker_instruction(&request()).contains("no profile"));
    }

    #[test]
    fn rewrite_prompt_carries_all_feedback() {
        let review = ReviewResult {
            score: 5,
            strengths: vec![],
            weaknesses: vec!["too dense".into()],
            missing_topics: vec!["storage".into()],
            improvement_suggestions: vec![],
        };
        let manuscript = Manuscript {
            title: "T".into(),
            sections: vec![],
        };
        let prompt = rewrite_prompt(&request(), &manuscript, &review);
        assert!(prompt.user.contains("- too dense"));
        assert!(prompt.user.contains("- storage"));
        assert!(prompt.user.contains("- (none)"));
    }
}
