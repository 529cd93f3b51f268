#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deck_harness::gateway::{ChatGateway, ChatRequest, ChatResponse, ProviderError};
use deck_harness::images::{ImageSearch, ImageSearchError};
use deck_harness::{ImageCandidate, ModelRouter, ProviderClient, RunRequest};
use serde_json::json;

// =============================================================================
// Scripted gateway
// =============================================================================

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub caller: &'static str,
    pub model: String,
    pub user: String,
    pub images: Vec<String>,
    pub json_mode: bool,
}

/// Answers by `attribution.caller`: queued replies first, then the caller's
/// default. Vision calls answer by image url.
#[derive(Default)]
pub struct ScriptedGateway {
    queued: Mutex<HashMap<&'static str, VecDeque<Result<String, ProviderError>>>>,
    defaults: Mutex<HashMap<&'static str, String>>,
    vision: Mutex<HashMap<String, String>>,
    vision_errors: Mutex<HashMap<String, ProviderError>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, caller: &'static str, reply: impl Into<String>) {
        self.queued
            .lock()
            .unwrap()
            .entry(caller)
            .or_default()
            .push_back(Ok(reply.into()));
    }

    pub fn push_err(&self, caller: &'static str, err: ProviderError) {
        self.queued
            .lock()
            .unwrap()
            .entry(caller)
            .or_default()
            .push_back(Err(err));
    }

    pub fn always(&self, caller: &'static str, reply: impl Into<String>) {
        self.defaults.lock().unwrap().insert(caller, reply.into());
    }

    pub fn vision_for(&self, url: &str, score: f64, safe: bool) {
        self.vision.lock().unwrap().insert(
            url.to_string(),
            json!({ "score": score, "safe": safe, "reason": "scripted" }).to_string(),
        );
    }

    /// The next vision call for `url` fails with `err`.
    pub fn vision_err_for(&self, url: &str, err: ProviderError) {
        self.vision_errors
            .lock()
            .unwrap()
            .insert(url.to_string(), err);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, caller: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.caller == caller)
            .count()
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let caller = req.attribution.caller;
        let user = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, deck_harness::gateway::Role::User))
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let images: Vec<String> = req.messages.iter().flat_map(|m| m.images.clone()).collect();
        self.calls.lock().unwrap().push(RecordedCall {
            caller,
            model: req.model.model_id().to_string(),
            user,
            images: images.clone(),
            json_mode: req.json_mode,
        });

        if let Some(err) = images
            .first()
            .and_then(|url| self.vision_errors.lock().unwrap().remove(url))
        {
            return Err(err);
        }
        if let Some(reply) = images
            .first()
            .and_then(|url| self.vision.lock().unwrap().get(url).cloned())
        {
            return Ok(ChatResponse::text(reply));
        }

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(caller)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(Ok(reply)) => Ok(ChatResponse::text(reply)),
            Some(Err(err)) => Err(err),
            None => match self.defaults.lock().unwrap().get(caller) {
                Some(reply) => Ok(ChatResponse::text(reply.clone())),
                None => Err(ProviderError::invalid_request(format!(
                    "no scripted reply for {caller}"
                ))),
            },
        }
    }
}

pub fn client_for(gateway: Arc<ScriptedGateway>) -> ProviderClient {
    ProviderClient::new(gateway, Arc::new(ModelRouter::default()))
}

// =============================================================================
// Stub image search
// =============================================================================

#[derive(Default)]
pub struct StubSearch {
    results: HashMap<String, Vec<ImageCandidate>>,
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
    pub calls: AtomicUsize,
}

impl StubSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, query: &str, urls: &[&str]) -> Self {
        let candidates = urls
            .iter()
            .enumerate()
            .map(|(i, url)| ImageCandidate {
                url: url.to_string(),
                rank: i + 1,
                width: 1600,
                height: 900,
            })
            .collect();
        self.results.insert(query.to_string(), candidates);
        self
    }

    pub fn delayed(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_string(), delay);
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSearch for StubSearch {
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ImageCandidate>, ImageSearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.iter().any(|q| q == query) {
            return Err(ImageSearchError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(self
            .results
            .get(query)
            .map(|c| c.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Three-minute talk: 3-6 slides.
pub fn request() -> RunRequest {
    RunRequest::new("Solar power", 3, "students", "English")
}

pub fn outline_json() -> String {
    json!({
        "title": "Solar Power 101",
        "sections": [
            { "type": "introduction", "title": "Why the sun", "key_points": ["free energy"] },
            { "type": "main", "title": "How panels work", "key_points": ["photons", "cells"] },
            { "type": "conclusion", "title": "What next", "key_points": ["act"] }
        ]
    })
    .to_string()
}

pub fn manuscript_json(marker: &str) -> String {
    json!({
        "title": "Solar Power 101",
        "sections": [
            { "name": "Introduction", "content": format!("{marker} The sun delivers more energy than we need.") },
            { "name": "How panels work", "content": "Photons knock electrons loose in silicon cells." },
            { "name": "Conclusion", "content": "Put a panel on your roof." }
        ]
    })
    .to_string()
}

pub fn review_json(score: u8) -> String {
    json!({
        "score": score,
        "strengths": ["clear"],
        "weaknesses": ["thin examples"],
        "missing_topics": [],
        "improvement_suggestions": ["add a case study"]
    })
    .to_string()
}

/// Slides 1 and 3 ask for images.
pub fn slides_json() -> String {
    json!({
        "slides": [
            { "slide_number": 1, "title": "Why the sun", "bullet_points": ["free energy"], "image_query": "sunrise field" },
            { "slide_number": 2, "title": "How panels work", "bullet_points": ["photons", "cells"] },
            { "slide_number": 3, "title": "What next", "bullet_points": ["act"], "image_query": "rooftop solar" }
        ]
    })
    .to_string()
}

pub fn notes_json() -> String {
    json!({
        "notes": [
            { "slide_number": 1, "speaker_notes": "Open with a question." },
            { "slide_number": 2, "speaker_notes": "Walk through the diagram." },
            { "slide_number": 3, "speaker_notes": "Close with a call to action." }
        ]
    })
    .to_string()
}

/// Every stage answers well on the first try; review scores 9.
pub fn script_happy_path(gateway: &ScriptedGateway) {
    gateway.always("outline", outline_json());
    gateway.always("manuscript", manuscript_json("Hello."));
    gateway.always("script_review_evaluate", review_json(9));
    gateway.always("slides", slides_json());
    gateway.always("notes", notes_json());
}
