//! Gemini text-generation client (blocking HTTP, retry with model fallback).

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{is_retryable_status, resolve_api_key, AiError, RetryPolicy, TextGenerator};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
/// Model used for the remaining attempts once the primary keeps failing.
const FALLBACK_MODEL: &str = "gemini-2.0-flash-exp";

const ENV_VAR: &str = "GEMINI_API_KEY";
const KEY_FILE: &str = "gemini_api_key.txt";

pub struct GeminiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Key from `GEMINI_API_KEY` (or `GOOGLE_API_KEY`), falling back to
    /// `~/.sortify/gemini_api_key.txt`.
    pub fn from_env() -> Result<Self, AiError> {
        let key = resolve_api_key(ENV_VAR, KEY_FILE)
            .or_else(|| resolve_api_key("GOOGLE_API_KEY", KEY_FILE))
            .ok_or(AiError::MissingApiKey("gemini", ENV_VAR))?;
        Ok(Self::new(key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn request_once(&self, model: &str, prompt: &str) -> Result<String, AiError> {
        let url = format!("{}/{}:generateContent?key={}", API_BASE, model, self.api_key);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self.http.post(&url).json(&body).send()?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response.json()?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AiError::EmptyResponse("gemini"));
        }
        Ok(text)
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let mut model = self.model.as_str();
        let mut last_err = None;

        for attempt in 1..=self.retry.max_attempts {
            match self.request_once(model, prompt) {
                Ok(text) => return Ok(text),
                Err(AiError::Api { status, message }) => {
                    let code = reqwest::StatusCode::from_u16(status)
                        .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR);
                    if !is_retryable_status(code) {
                        return Err(AiError::Api { status, message });
                    }
                    log::warn!(
                        "gemini {} attempt {}/{} failed with {}",
                        model,
                        attempt,
                        self.retry.max_attempts,
                        status
                    );
                    if attempt >= self.retry.fallback_after && model != FALLBACK_MODEL {
                        log::info!("gemini switching to fallback model {}", FALLBACK_MODEL);
                        model = FALLBACK_MODEL;
                    }
                    last_err = Some(AiError::Api { status, message });
                }
                Err(e) => return Err(e),
            }
            if attempt < self.retry.max_attempts {
                thread::sleep(self.retry.backoff(attempt));
            }
        }

        // One last try on the fallback model before giving up.
        if model != FALLBACK_MODEL {
            log::info!("gemini final retry with fallback model {}", FALLBACK_MODEL);
            thread::sleep(Duration::from_millis(250));
            return self.request_once(FALLBACK_MODEL, prompt);
        }
        Err(last_err.unwrap_or(AiError::EmptyResponse("gemini")))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: ContentOut,
}

#[derive(Deserialize, Default)]
struct ContentOut {
    #[serde(default)]
    parts: Vec<Part>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing_joins_parts() {
        let json = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Hello "}, {"text": "world"}]}}
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(json).unwrap();
        let joined: String = parsed.candidates[0]
            .content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(joined, "Hello world");
    }

    #[test]
    fn test_response_parsing_tolerates_empty_body() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.candidates.is_empty());
    }
}
