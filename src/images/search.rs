//! Image search providers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;

use crate::types::ImageCandidate;

const DEFAULT_BASE_URL: &str = "https://api.unsplash.com";

#[derive(Debug, thiserror::Error)]
pub enum ImageSearchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image search returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid search response: {0}")]
    Parse(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl ImageSearchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_error",
            Self::Status { .. } => "status",
            Self::Parse(_) => "parse",
            Self::Config(_) => "config_error",
        }
    }
}

/// Ranked image lookup for a free-text query.
#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// At most `limit` candidates, best first, ranks starting at 1.
    async fn search(&self, query: &str, limit: usize)
        -> Result<Vec<ImageCandidate>, ImageSearchError>;
}

// =============================================================================
// Unsplash
// =============================================================================

#[derive(Debug, Clone)]
pub struct UnsplashClient {
    client: reqwest::Client,
    base_url: String,
}

impl UnsplashClient {
    pub fn new(access_key: impl Into<String>) -> Result<Self, ImageSearchError> {
        Self::with_config(access_key, DEFAULT_BASE_URL, Duration::from_secs(15))
    }

    /// `UNSPLASH_ACCESS_KEY`, optional `UNSPLASH_BASE_URL`.
    pub fn from_env() -> Result<Self, ImageSearchError> {
        let access_key = std::env::var("UNSPLASH_ACCESS_KEY")
            .map_err(|_| ImageSearchError::Config("UNSPLASH_ACCESS_KEY not set".into()))?;
        let base_url =
            std::env::var("UNSPLASH_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        Self::with_config(access_key, base_url, Duration::from_secs(15))
    }

    pub fn with_config(
        access_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ImageSearchError> {
        let access_key = access_key.into();
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Client-ID {access_key}"))
            .map_err(|_| ImageSearchError::Config("invalid access key format".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert("accept-version", HeaderValue::from_static("v1"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ImageSearchError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<PhotoResult>,
}

#[derive(Debug, Deserialize)]
struct PhotoResult {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    urls: PhotoUrls,
}

#[derive(Debug, Default, Deserialize)]
struct PhotoUrls {
    regular: Option<String>,
    small: Option<String>,
}

impl PhotoResult {
    fn url(&self) -> Option<&str> {
        self.urls
            .regular
            .as_deref()
            .or(self.urls.small.as_deref())
            .filter(|u| !u.is_empty())
    }
}

/// Landscape results with a usable url, or every result with a url when none
/// is landscape. Rank is the provider's 1-based position.
fn to_candidates(results: &[PhotoResult], limit: usize) -> Vec<ImageCandidate> {
    let ranked = || {
        results.iter().enumerate().filter_map(|(i, r)| {
            r.url().map(|url| ImageCandidate {
                url: url.to_string(),
                rank: i + 1,
                width: r.width,
                height: r.height,
            })
        })
    };
    let landscape: Vec<ImageCandidate> = ranked().filter(|c| c.is_landscape()).take(limit).collect();
    if !landscape.is_empty() {
        return landscape;
    }
    ranked().take(limit).collect()
}

#[async_trait]
impl ImageSearch for UnsplashClient {
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ImageCandidate>, ImageSearchError> {
        let per_page = limit.clamp(1, 30).to_string();
        let response = self
            .client
            .get(format!("{}/search/photos", self.base_url))
            .query(&[
                ("query", query),
                ("per_page", per_page.as_str()),
                ("orientation", "landscape"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageSearchError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        let body = response.text().await?;
        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| ImageSearchError::Parse(e.to_string()))?;
        Ok(to_candidates(&parsed.results, limit))
    }
}
