//! Run configuration.
//!
//! Loaded once at startup: an optional JSON file, then `DECK_*` environment
//! overrides, then validation. The result is an immutable snapshot; the
//! pipeline and router only ever read it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::router::Task;

pub const DEFAULT_REVIEW_THRESHOLD: u8 = 8;
pub const DEFAULT_IMAGE_CANDIDATES: usize = 3;
pub const DEFAULT_MAX_PARALLEL_SLIDES: usize = 4;

const MAX_IMAGE_CANDIDATES: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Model routing inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Global override applied to every task without its own override.
    pub default_model: Option<String>,
    /// Per-task overrides keyed by task name (e.g. "slides").
    pub tasks: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub models: ModelSettings,
    /// Manuscripts scoring below this are rewritten once.
    pub review_threshold: u8,
    /// Search results scored per slide.
    pub image_candidates: usize,
    /// Slides enriched concurrently.
    pub max_parallel_slides: usize,
    /// Patch factual issues after review.
    pub fact_check: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            models: ModelSettings::default(),
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            image_candidates: DEFAULT_IMAGE_CANDIDATES,
            max_parallel_slides: DEFAULT_MAX_PARALLEL_SLIDES,
            fact_check: false,
        }
    }
}

impl Settings {
    /// File (if any) + process environment + validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        settings.apply_env_from(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `DECK_*` overrides from an arbitrary lookup (the process env in
    /// production, a map in tests).
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("DECK_MODEL") {
            self.models.default_model = Some(model.trim().to_string());
        }
        for task in Task::ALL {
            let key = format!("DECK_MODEL_{}", task.env_suffix());
            if let Some(model) = get(&key) {
                self.models
                    .tasks
                    .insert(task.as_str().to_string(), model.trim().to_string());
            }
        }
        if let Some(v) = get("DECK_REVIEW_THRESHOLD") {
            self.review_threshold = parse_env("DECK_REVIEW_THRESHOLD", &v)?;
        }
        if let Some(v) = get("DECK_IMAGE_CANDIDATES") {
            self.image_candidates = parse_env("DECK_IMAGE_CANDIDATES", &v)?;
        }
        if let Some(v) = get("DECK_MAX_PARALLEL_SLIDES") {
            self.max_parallel_slides = parse_env("DECK_MAX_PARALLEL_SLIDES", &v)?;
        }
        if let Some(v) = get("DECK_FACT_CHECK") {
            self.fact_check = parse_env("DECK_FACT_CHECK", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in self.models.tasks.keys() {
            if name.parse::<Task>().is_err() {
                return Err(ConfigError::Invalid(format!(
                    "unknown task in models.tasks: {name}"
                )));
            }
        }
        if self.review_threshold > 10 {
            return Err(ConfigError::Invalid(format!(
                "review_threshold must be in [0,10], got {}",
                self.review_threshold
            )));
        }
        if self.image_candidates == 0 || self.image_candidates > MAX_IMAGE_CANDIDATES {
            return Err(ConfigError::Invalid(format!(
                "image_candidates must be in [1,{MAX_IMAGE_CANDIDATES}], got {}",
                self.image_candidates
            )));
        }
        if self.max_parallel_slides == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel_slides must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
