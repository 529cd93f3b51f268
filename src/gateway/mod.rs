//! Chat transport.
//!
//! One request in, one response or error out. The gateway never retries; the
//! stage runners decide whether a second attempt is warranted and what it
//! should say.

pub mod error;
pub mod openrouter;
pub mod pricing;
pub mod types;
pub mod usage;

use std::sync::Arc;

use openrouter::{ChatProvider, OpenRouterAdapter};
use usage::{ProviderCallRecord, UsageSink as UsageSinkTrait};

pub use error::{ErrorContext, ProviderError, ProviderErrorKind};
pub use pricing::*;
pub use types::*;
pub use usage::{NoopUsageSink, TracingUsageSink, UsageSink};

/// Text and vision generation surface the pipeline depends on.
///
/// Vision requests are ordinary chat requests whose messages carry images.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// OpenRouter plus a usage sink that sees every call.
pub struct ProviderGateway<U: UsageSinkTrait> {
    openrouter: OpenRouterAdapter,
    usage_sink: Arc<U>,
}

#[async_trait::async_trait]
impl<U: UsageSinkTrait> ChatGateway for ProviderGateway<U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        ProviderGateway::chat(self, req).await
    }
}

impl<U: UsageSinkTrait> ProviderGateway<U> {
    pub fn new(openrouter: OpenRouterAdapter, usage_sink: Arc<U>) -> Self {
        Self {
            openrouter,
            usage_sink,
        }
    }

    pub fn from_env(usage_sink: Arc<U>) -> Result<Self, ProviderError> {
        Ok(Self::new(OpenRouterAdapter::from_env()?, usage_sink))
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let result = self.openrouter.chat(&req).await;
        let record = match &result {
            Ok(resp) => usage_record(&req, resp),
            Err(err) => usage_record(&req, &ChatResponse::empty()).error(err.code()),
        };
        self.usage_sink.record(record).await;
        result
    }
}

fn usage_record(req: &ChatRequest, resp: &ChatResponse) -> ProviderCallRecord {
    ProviderCallRecord::new(
        req.model.provider(),
        "chat/completions",
        req.model.model_id(),
        req.attribution.caller,
    )
    .tokens(resp.input_tokens as i32, resp.output_tokens as i32)
    .cost(resp.cost_nanodollars)
    .upstream_cost(resp.upstream_cost_nanodollars)
    .job(req.attribution.job_id)
    .latency(resp.latency.as_millis() as i32)
}
