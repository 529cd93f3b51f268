//! Uniform structured-call surface over the chat gateway.
//!
//! Every call names a [`Task`]; the client resolves the model through the
//! shared [`ModelRouter`], sends the request, pulls the first JSON object out
//! of the reply and deserializes it. Parse failures surface as
//! `ProviderError::InvalidResponse` so stage runners can tell them apart from
//! transport failures. No retries happen here.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::gateway::{
    Attribution, ChatGateway, ChatModel, ChatRequest, ChatResponse, Message, ProviderError,
};
use crate::prompts::{vision_prompt, PromptInstance, VISION_SYSTEM};
use crate::router::{ModelRouter, Task};
use crate::trace::{now_epoch_ms, CallTrace, TraceSink};
use crate::types::ImageScore;

/// Output cap for structured calls. GPT-5 models spend part of it on hidden
/// reasoning before any visible output.
const MAX_OUTPUT_TOKENS: u32 = 8_192;
const VISION_MAX_OUTPUT_TOKENS: u32 = 512;

/// Snapshot of what a client has spent so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientUsage {
    pub calls: u64,
    pub cost_nanodollars: i64,
}

pub struct ProviderClient {
    gateway: Arc<dyn ChatGateway>,
    router: Arc<ModelRouter>,
    trace: Option<Arc<dyn TraceSink>>,
    run_id: Option<Uuid>,
    calls: AtomicU64,
    cost_nanodollars: AtomicI64,
}

impl ProviderClient {
    pub fn new(gateway: Arc<dyn ChatGateway>, router: Arc<ModelRouter>) -> Self {
        Self {
            gateway,
            router,
            trace: None,
            run_id: None,
            calls: AtomicU64::new(0),
            cost_nanodollars: AtomicI64::new(0),
        }
    }

    pub fn with_trace(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub fn usage(&self) -> ClientUsage {
        ClientUsage {
            calls: self.calls.load(Ordering::Relaxed),
            cost_nanodollars: self.cost_nanodollars.load(Ordering::Relaxed),
        }
    }

    /// Text call that must come back as a `T`.
    pub async fn call_structured<T: DeserializeOwned>(
        &self,
        task: Task,
        prompt: &PromptInstance,
    ) -> Result<T, ProviderError> {
        let content = self
            .dispatch(
                task,
                prompt.to_messages(),
                prompt.template_slug,
                prompt.hash(),
                MAX_OUTPUT_TOKENS,
            )
            .await?;
        parse_structured(&content)
    }

    /// Score one image against a slide description.
    pub async fn call_vision(
        &self,
        task: Task,
        image_url: &str,
        context: &str,
    ) -> Result<ImageScore, ProviderError> {
        let text = vision_prompt(context);
        let hash = blake3::hash(format!("{text}\n{image_url}").as_bytes())
            .to_hex()
            .to_string();
        let messages = vec![
            Message::system(VISION_SYSTEM),
            Message::user_with_image(text, image_url),
        ];
        let content = self
            .dispatch(task, messages, "image_vision", hash, VISION_MAX_OUTPUT_TOKENS)
            .await?;
        let score: ImageScore = parse_structured(&content)?;
        if !score.score.is_finite() || !(0.0..=10.0).contains(&score.score) {
            return Err(ProviderError::invalid_response(format!(
                "image score out of range [0,10]: {}",
                score.score
            )));
        }
        Ok(score)
    }

    async fn dispatch(
        &self,
        task: Task,
        messages: Vec<Message>,
        template_slug: &'static str,
        prompt_hash: String,
        max_tokens: u32,
    ) -> Result<String, ProviderError> {
        let model = self.router.resolve(task).to_string();
        let mut attribution = Attribution::new(task.as_str());
        if let Some(run_id) = self.run_id {
            attribution = attribution.with_job(run_id);
        }

        let mut request = ChatRequest::new(ChatModel::openrouter(&model), messages, attribution)
            .max_tokens(max_tokens);
        // Only OpenAI models reliably support response_format=json_object via OpenRouter.
        if model.starts_with("openai/") {
            request = request.json();
        }

        let start = Instant::now();
        let result = self.gateway.chat(request).await;
        self.calls.fetch_add(1, Ordering::Relaxed);

        match &result {
            Ok(resp) => {
                self.cost_nanodollars
                    .fetch_add(resp.cost_nanodollars, Ordering::Relaxed);
                debug!(
                    task = task.as_str(),
                    model = %model,
                    input_tokens = resp.input_tokens,
                    output_tokens = resp.output_tokens,
                    "provider call ok"
                );
            }
            Err(err) => debug!(
                task = task.as_str(),
                model = %model,
                error = %err,
                kind = err.kind().as_str(),
                "provider call failed"
            ),
        }

        self.record_trace(task, &model, template_slug, prompt_hash, start, &result);

        let resp = result?;
        if resp.content.trim().is_empty() {
            return Err(ProviderError::invalid_response("empty response"));
        }
        Ok(resp.content)
    }

    fn record_trace(
        &self,
        task: Task,
        model: &str,
        template_slug: &'static str,
        prompt_hash: String,
        start: Instant,
        result: &Result<ChatResponse, ProviderError>,
    ) {
        let Some(trace) = &self.trace else {
            return;
        };
        let (input_tokens, output_tokens, cost, error) = match result {
            Ok(resp) => (
                resp.input_tokens,
                resp.output_tokens,
                resp.cost_nanodollars,
                None,
            ),
            Err(err) => (0, 0, 0, Some(err.to_string())),
        };
        let event = CallTrace {
            timestamp_ms: now_epoch_ms(),
            run_id: self.run_id.map(|id| id.to_string()),
            task: task.as_str().to_string(),
            model: model.to_string(),
            template_slug: template_slug.to_string(),
            prompt_hash,
            input_tokens,
            output_tokens,
            cost_nanodollars: cost,
            latency_ms: start.elapsed().as_millis() as u64,
            error,
        };
        if let Err(err) = trace.record(event) {
            warn!(error = %err, "trace sink rejected call record");
        }
    }
}

fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, ProviderError> {
    let json = extract_json(raw)
        .ok_or_else(|| ProviderError::invalid_response("no JSON object in response"))?;
    serde_json::from_str(json).map_err(|e| ProviderError::invalid_response(e.to_string()))
}

/// Extract the first balanced JSON object from a reply (handles models that
/// add surrounding text or code fences). Braces inside strings are skipped.
pub fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let remainder = &raw[start..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in remainder.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&remainder[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Titled {
        title: String,
    }

    #[test]
    fn extracts_object_from_fenced_prose() {
        let raw = "Sure! Here it is:\n```json\n{\"title\": \"a {b} c\"}\n```\nanything else?";
        assert_eq!(extract_json(raw), Some("{\"title\": \"a {b} c\"}"));
    }

    #[test]
    fn handles_escaped_quotes_and_nesting() {
        let raw = r#"{"title": "say \"}\" twice", "inner": {"x": 1}} trailing"#;
        assert_eq!(
            extract_json(raw),
            Some(r#"{"title": "say \"}\" twice", "inner": {"x": 1}}"#)
        );
    }

    #[test]
    fn unbalanced_or_missing_objects_yield_none() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{\"title\": \"cut off"), None);
    }

    #[test]
    fn parse_failures_are_schema_failures() {
        let err = parse_structured::<Titled>("{\"name\": 1}").unwrap_err();
        assert!(err.is_schema_failure());
        let err = parse_structured::<Titled>("nothing").unwrap_err();
        assert!(err.is_schema_failure());
        let ok: Titled = parse_structured("{\"title\": \"x\"}").unwrap();
        assert_eq!(ok.title, "x");
    }
}
