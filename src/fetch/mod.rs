use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_REGISTRATION_BASE: &str = "https://api.nuget.org/v3/registration5-gz-semver2";

static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("nupac/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
});

/// Fetch failures, split so the graph walker can treat a missing
/// document differently from a transport fault.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("request for {url} failed: {reason}")]
    Transient { url: String, reason: String },
}

/// Narrow contract the registration walker consumes. Implementations
/// must report a missing document as `NotFound`, never as success.
pub trait FetchJson: Send + Sync {
    fn fetch_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// Production fetcher over the shared blocking HTTP client.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

impl FetchJson for HttpFetcher {
    fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = CLIENT.get(url).send().map_err(|e| FetchError::Transient {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !response.status().is_success() {
            return Err(FetchError::Transient {
                url: url.to_string(),
                reason: format!("status {}", response.status()),
            });
        }
        response.json().map_err(|e| FetchError::Transient {
            url: url.to_string(),
            reason: format!("invalid json: {e}"),
        })
    }
}
