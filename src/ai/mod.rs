//! Text-generation bridge: optional AI labels and summaries.
//!
//! The triage core depends only on the [`TextGenerator`] trait; which
//! backend answers is a deployment choice, not a correctness one. Two
//! providers ship here (Gemini and Perplexity), both plain blocking HTTP
//! with retry/backoff and a fallback model on sustained overload.

pub mod bridge;
pub mod gemini;
pub mod perplexity;
pub mod prompts;

pub use bridge::{suggest_category, summarize_batch, summarize_email, BatchReport};
pub use gemini::GeminiClient;
pub use perplexity::PerplexityClient;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Empty response from {0}")]
    EmptyResponse(&'static str),

    #[error("No API key for {0} (set {1} or create the key file)")]
    MissingApiKey(&'static str, &'static str),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

/// The text-generation collaborator seam.
pub trait TextGenerator {
    /// Send one prompt, return the generated free text.
    fn generate(&self, prompt: &str) -> Result<String, AiError>;

    /// Provider name for logs and reports.
    fn name(&self) -> &'static str;
}

// ============================================================================
// Provider factory
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    Perplexity,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Provider> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Some(Provider::Gemini),
            "perplexity" => Some(Provider::Perplexity),
            _ => None,
        }
    }
}

/// Build a provider from its environment/key-file configuration.
pub fn create_provider(provider: Provider) -> Result<Box<dyn TextGenerator>, AiError> {
    match provider {
        Provider::Gemini => Ok(Box::new(GeminiClient::from_env()?)),
        Provider::Perplexity => Ok(Box::new(PerplexityClient::from_env()?)),
    }
}

/// Resolve an API key: environment variable first, then a key file under
/// `~/.sortify/`.
pub(crate) fn resolve_api_key(env_var: &str, key_file: &str) -> Option<String> {
    if let Ok(key) = std::env::var(env_var) {
        let key = key.trim().to_string();
        if !key.is_empty() {
            return Some(key);
        }
    }
    let path: PathBuf = dirs::home_dir()?.join(".sortify").join(key_file);
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let key = content.trim().to_string();
            if key.is_empty() {
                None
            } else {
                log::info!("API key loaded from {}", path.display());
                Some(key)
            }
        }
        Err(_) => None,
    }
}

// ============================================================================
// Retry policy
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// After this many failed attempts, switch to the provider's fallback
    /// model for the remaining tries.
    pub fallback_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            fallback_after: 2,
        }
    }
}

impl RetryPolicy {
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        let exponent = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(exponent)
            .min(self.max_backoff)
    }
}

/// Transient statuses worth retrying: rate limits and server-side errors.
pub(crate) fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

// ============================================================================
// Tests
// ============================================================================
