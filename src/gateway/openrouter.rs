//! OpenRouter transport.
//!
//! Speaks the OpenAI-compatible `/chat/completions` wire format, so pointing
//! `OPENROUTER_BASE_URL` at any compatible endpoint works. Messages with images
//! are sent as content parts for vision scoring.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::pricing::chat_cost;
use super::types::*;

const PROVIDER: &str = "openrouter";
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// Assumed wait on 429; OpenRouter does not always send `retry-after`.
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

/// Body bytes read before giving up on a response.
const BODY_CAP: usize = 1 << 20;
/// Summed message text accepted per request.
const PROMPT_CHAR_CAP: usize = 500_000;

/// Lowercased openings that mark a reply as a refusal.
const REFUSAL_OPENERS: &[&str] = &[
    "refus",
    "i cannot",
    "i can't",
    "i won't",
    "i will not",
    "i am unable to",
    "i'm unable to",
    "unable to comply",
    "unable to assist",
    "unable to help",
    "unable to provide",
];

/// One completion per call, no retries.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct OpenRouterAdapter {
    client: reqwest::Client,
    endpoint: String,
}

impl OpenRouterAdapter {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_config(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT, None, None)
    }

    /// Reads `OPENROUTER_API_KEY` (required) plus the optional
    /// `OPENROUTER_BASE_URL`, `OPENROUTER_TIMEOUT_SECONDS`, `OPENROUTER_REFERER`
    /// and `OPENROUTER_APP_TITLE`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ProviderError::config("OPENROUTER_API_KEY not set"))?;
        let base_url =
            std::env::var("OPENROUTER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout = std::env::var("OPENROUTER_TIMEOUT_SECONDS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);

        Self::with_config(
            api_key,
            base_url,
            timeout,
            std::env::var("OPENROUTER_REFERER").ok(),
            std::env::var("OPENROUTER_APP_TITLE").ok(),
        )
    }

    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        referer: Option<String>,
        app_title: Option<String>,
    ) -> Result<Self, ProviderError> {
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.into()))
            .map_err(|_| ProviderError::config("API key is not a valid header value"))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, bearer);
        // Attribution headers are optional; unusable values are skipped.
        for (name, value) in [("HTTP-Referer", referer), ("X-Title", app_title)] {
            if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
                headers.insert(name, value);
            }
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("http client: {e}")))?;

        let base_url = base_url.into();
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }
}

fn looks_like_refusal(text: &str) -> bool {
    let lowered = text.trim_start().to_lowercase();
    let opening = lowered.lines().next().unwrap_or_default();
    REFUSAL_OPENERS.iter().any(|p| opening.starts_with(p)) || lowered.contains("request was refused")
}

fn nanodollars_from_usd(usd: f64) -> i64 {
    ((usd * 1e9).round() as i64).max(0)
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireFormat>,
}

impl<'a> WireRequest<'a> {
    fn from_request(req: &'a ChatRequest) -> Self {
        Self {
            model: req.model.model_id(),
            messages: req.messages.iter().map(WireMessage::from).collect(),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            response_format: req.json_mode.then_some(WireFormat {
                kind: "json_object",
            }),
        }
    }
}

#[derive(Serialize)]
struct WireFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: WireContent<'a>,
}

/// A bare string, or text plus image parts for vision models.
#[derive(Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<WirePart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: WireImage<'a> },
}

#[derive(Serialize)]
struct WireImage<'a> {
    url: &'a str,
    detail: &'static str,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        let content = if msg.images.is_empty() {
            WireContent::Text(&msg.content)
        } else {
            let text = std::iter::once(WirePart::Text { text: &msg.content });
            let images = msg.images.iter().map(|url| WirePart::ImageUrl {
                image_url: WireImage { url, detail: "low" },
            });
            WireContent::Parts(text.chain(images).collect())
        };
        Self {
            role: msg.role.clone(),
            content,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    choices: Option<Vec<WireChoice>>,
    usage: Option<WireUsage>,
    error: Option<WireError>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: Option<WireReply>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireReply {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl WireReply {
    /// Message text, or the first non-empty tool call arguments when a model
    /// answers JSON mode through a tool call.
    fn into_text(self) -> String {
        match self.content {
            Some(text) if !text.trim().is_empty() => text,
            _ => self
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .filter_map(|call| call.function?.arguments)
                .find(|args| !args.trim().is_empty())
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct WireToolCall {
    function: Option<WireFunction>,
}

#[derive(Deserialize)]
struct WireFunction {
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    #[serde(default)]
    cost_details: Option<WireCost>,
}

#[derive(Deserialize)]
struct WireCost {
    upstream_inference_cost: Option<f64>,
}

#[derive(Deserialize)]
struct WireError {
    message: Option<String>,
    code: Option<String>,
}

async fn read_capped(mut response: reqwest::Response) -> Result<String, ProviderError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > BODY_CAP {
            return Err(ProviderError::provider(
                PROVIDER,
                format!("response body over {BODY_CAP} bytes"),
                false,
            ));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Maps a non-2xx reply onto the error taxonomy. 429 and 5xx are transient.
fn http_failure(status: StatusCode, body: &str, mut ctx: ErrorContext) -> ProviderError {
    let code = status.as_u16();
    let upstream = serde_json::from_str::<Envelope>(body)
        .ok()
        .and_then(|envelope| envelope.error);
    if let Some(provider_code) = upstream.as_ref().and_then(|e| e.code.clone()) {
        ctx = ctx.with_code(provider_code);
    }
    let message = upstream
        .and_then(|e| e.message)
        .unwrap_or_else(|| format!("HTTP {code}"));

    match code {
        429 => ProviderError::rate_limited(RATE_LIMIT_BACKOFF, ctx),
        400 | 413 | 422 => ProviderError::InvalidRequest {
            message,
            context: Some(ctx),
        },
        _ => ProviderError::provider_with_context(PROVIDER, message, code >= 500, ctx),
    }
}

#[async_trait]
impl ChatProvider for OpenRouterAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let prompt_chars: usize = req.messages.iter().map(|m| m.content.len()).sum();
        if prompt_chars > PROMPT_CHAR_CAP {
            return Err(ProviderError::invalid_request(format!(
                "prompt is {prompt_chars} chars, limit {PROMPT_CHAR_CAP}"
            )));
        }

        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&WireRequest::from_request(req))
            .send()
            .await?;

        let status = response.status();
        let mut ctx = ErrorContext::new().with_status(status.as_u16());
        if let Some(id) = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
        {
            ctx = ctx.with_request_id(id);
        }
        let body = read_capped(response).await?;

        if !status.is_success() {
            return Err(http_failure(status, &body, ctx));
        }

        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("openrouter envelope is not JSON: {e}"))
        })?;

        // A 200 can still carry an error object.
        if let Some(error) = envelope.error {
            let message = error.message.unwrap_or_default();
            return Err(if looks_like_refusal(&message) {
                ProviderError::refused(message)
            } else {
                ProviderError::provider(PROVIDER, message, false)
            });
        }

        let choice = envelope
            .choices
            .and_then(|choices| choices.into_iter().next())
            .ok_or_else(|| ProviderError::invalid_response("no choices in response"))?;
        let content = choice.message.map(WireReply::into_text).unwrap_or_default();
        if looks_like_refusal(&content) {
            return Err(ProviderError::refused(content));
        }

        // Some compatible backends omit usage; those calls are billed as zero.
        let usage = envelope.usage;
        let input_tokens = usage.as_ref().and_then(|u| u.prompt_tokens).unwrap_or(0);
        let output_tokens = usage.as_ref().and_then(|u| u.completion_tokens).unwrap_or(0);
        let upstream_cost_nanodollars = usage
            .and_then(|u| u.cost_details)
            .and_then(|d| d.upstream_inference_cost)
            .map(nanodollars_from_usd);

        Ok(ChatResponse {
            content,
            input_tokens,
            output_tokens,
            cost_nanodollars: chat_cost(req.model.model_id(), input_tokens, output_tokens),
            upstream_cost_nanodollars,
            latency: started.elapsed(),
            finish_reason: FinishReason::from(choice.finish_reason),
        })
    }
}
