//! Per-task model routing.
//!
//! Every provider call names a [`Task`]. The router turns it into a concrete
//! model id: task override, then global override, then the built-in default.
//! The table is built once from [`ModelSettings`] and never mutated.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::ModelSettings;

/// Logical call sites that can be routed to different models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
    Outline,
    Manuscript,
    ScriptReviewEvaluate,
    ScriptReviewRewrite,
    FactCheck,
    Slides,
    Notes,
    ImageVision,
    OtherTasks,
}

impl Task {
    pub const ALL: [Task; 9] = [
        Task::Outline,
        Task::Manuscript,
        Task::ScriptReviewEvaluate,
        Task::ScriptReviewRewrite,
        Task::FactCheck,
        Task::Slides,
        Task::Notes,
        Task::ImageVision,
        Task::OtherTasks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Outline => "outline",
            Task::Manuscript => "manuscript",
            Task::ScriptReviewEvaluate => "script_review_evaluate",
            Task::ScriptReviewRewrite => "script_review_rewrite",
            Task::FactCheck => "fact_check",
            Task::Slides => "slides",
            Task::Notes => "notes",
            Task::ImageVision => "image_vision",
            Task::OtherTasks => "other_tasks",
        }
    }

    /// Built-in model for this task: small models for extraction and scoring,
    /// large ones for long-form writing.
    pub fn default_model(&self) -> &'static str {
        match self {
            Task::Outline => "openai/gpt-4o",
            Task::Manuscript => "openai/gpt-5",
            Task::ScriptReviewEvaluate => "openai/gpt-5-mini",
            Task::ScriptReviewRewrite => "openai/gpt-5",
            Task::FactCheck => "openai/gpt-5-mini",
            Task::Slides => "openai/gpt-4o",
            Task::Notes => "openai/gpt-5-mini",
            Task::ImageVision => "openai/gpt-4o",
            Task::OtherTasks => "openai/gpt-5",
        }
    }

    /// Environment variable suffix, e.g. `SCRIPT_REVIEW_EVALUATE`.
    pub fn env_suffix(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown task: {0}")]
pub struct UnknownTask(pub String);

impl FromStr for Task {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Task::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| UnknownTask(s.to_string()))
    }
}

/// Immutable task → model lookup.
#[derive(Debug, Clone, Default)]
pub struct ModelRouter {
    task_overrides: BTreeMap<Task, String>,
    global_override: Option<String>,
}

impl ModelRouter {
    /// Build a router from validated settings. Unknown task keys are ignored
    /// here; `Settings::validate` rejects them before this point.
    pub fn from_settings(models: &ModelSettings) -> Self {
        let task_overrides = models
            .tasks
            .iter()
            .filter_map(|(name, model)| {
                let model = model.trim();
                if model.is_empty() {
                    return None;
                }
                name.parse::<Task>().ok().map(|t| (t, model.to_string()))
            })
            .collect();
        let global_override = models
            .default_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        Self {
            task_overrides,
            global_override,
        }
    }

    pub fn with_task_override(mut self, task: Task, model: impl Into<String>) -> Self {
        self.task_overrides.insert(task, model.into());
        self
    }

    pub fn with_global_override(mut self, model: impl Into<String>) -> Self {
        self.global_override = Some(model.into());
        self
    }

    pub fn resolve(&self, task: Task) -> &str {
        if let Some(model) = self.task_overrides.get(&task) {
            return model;
        }
        if let Some(model) = &self.global_override {
            return model;
        }
        task.default_model()
    }

    /// Resolve a free-form task name; unknown names route like `other_tasks`.
    pub fn resolve_name(&self, task_name: &str) -> &str {
        let task = task_name.parse::<Task>().unwrap_or(Task::OtherTasks);
        self.resolve(task)
    }

    /// Resolved table, in task order, for display.
    pub fn table(&self) -> Vec<(Task, &str)> {
        Task::ALL.iter().map(|t| (*t, self.resolve(*t))).collect()
    }
}

impl fmt::Display for ModelRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ModelRouter(global={}, overrides={})",
            self.global_override.as_deref().unwrap_or("none"),
            self.task_overrides.len()
        )
    }
}
