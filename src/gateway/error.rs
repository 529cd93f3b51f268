//! Failure taxonomy for chat calls.
//!
//! Every failure is classified as [`ProviderErrorKind::Transient`] or
//! [`ProviderErrorKind::Permanent`]; the stage runners key their single retry
//! off that split.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Rate limits, timeouts, 5xx and dropped connections.
    Transient,
    /// Bad requests, refusals, unusable payloads and misconfiguration. The same
    /// input fails the same way.
    Permanent,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

/// What the upstream told us about a failed call.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub http_status: Option<u16>,
    /// The `error.code` field of the response body, when present.
    pub provider_code: Option<String>,
    /// Value of the `x-request-id` response header.
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        context: Option<ErrorContext>,
    },

    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        context: Option<ErrorContext>,
    },

    /// The model declined to answer.
    #[error("refused: {message}")]
    Refused {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Transport succeeded but the payload is empty, not JSON, or the wrong
    /// shape.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Upstream failure. `retryable` is set for 5xx.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        retryable: bool,
        context: Option<ErrorContext>,
    },

    #[error("timeout after {0:?}")]
    Timeout(Duration, Option<ErrorContext>),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn rate_limited(retry_after: Duration, context: ErrorContext) -> Self {
        Self::RateLimited {
            retry_after,
            context: Some(context),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            context: None,
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self::Refused {
            message: message.into(),
            context: None,
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn provider(provider: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: None,
        }
    }

    pub fn provider_with_context(
        provider: &'static str,
        message: impl Into<String>,
        retryable: bool,
        context: ErrorContext,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: Some(context),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn kind(&self) -> ProviderErrorKind {
        let transient = match self {
            Self::RateLimited { .. } | Self::Timeout(..) => true,
            Self::Provider { retryable, .. } => *retryable,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::InvalidRequest { .. }
            | Self::Refused { .. }
            | Self::InvalidResponse { .. }
            | Self::Config(_) => false,
        };
        if transient {
            ProviderErrorKind::Transient
        } else {
            ProviderErrorKind::Permanent
        }
    }

    /// The payload was the problem, not the transport.
    pub fn is_schema_failure(&self) -> bool {
        matches!(self, Self::InvalidResponse { .. })
    }

    /// Stable snake_case tag for usage records and traces.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Refused { .. } => "refused",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::Provider { .. } => "provider_error",
            Self::Timeout(..) => "timeout",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::RateLimited { context, .. }
            | Self::InvalidRequest { context, .. }
            | Self::Refused { context, .. }
            | Self::Provider { context, .. }
            | Self::Timeout(_, context) => context.as_ref(),
            Self::InvalidResponse { .. } | Self::Http(_) | Self::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_5xx_are_transient() {
        let err = ProviderError::rate_limited(Duration::from_secs(1), ErrorContext::new());
        assert_eq!(err.kind(), ProviderErrorKind::Transient);

        let err = ProviderError::provider("openrouter", "bad gateway", true);
        assert_eq!(err.kind(), ProviderErrorKind::Transient);

        let err = ProviderError::Timeout(Duration::from_secs(5), None);
        assert_eq!(err.kind(), ProviderErrorKind::Transient);
    }

    #[test]
    fn schema_and_policy_failures_are_permanent() {
        let err = ProviderError::invalid_response("missing field `sections`");
        assert_eq!(err.kind(), ProviderErrorKind::Permanent);
        assert!(err.is_schema_failure());

        let err = ProviderError::refused("no");
        assert_eq!(err.kind(), ProviderErrorKind::Permanent);
        assert!(!err.is_schema_failure());
    }

    #[test]
    fn context_survives_construction() {
        let ctx = ErrorContext::new().with_status(502).with_request_id("r-1");
        let err = ProviderError::provider_with_context("openrouter", "down", true, ctx);
        assert_eq!(err.context().and_then(|c| c.http_status), Some(502));
        assert_eq!(
            err.context().and_then(|c| c.request_id.as_deref()),
            Some("r-1")
        );
        assert_eq!(err.code(), "provider_error");
    }
}
