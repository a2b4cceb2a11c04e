//! Perplexity chat-completions client.

use std::thread;

use serde::{Deserialize, Serialize};

use super::{is_retryable_status, resolve_api_key, AiError, RetryPolicy, TextGenerator};

const API_URL: &str = "https://api.perplexity.ai/chat/completions";
const DEFAULT_MODEL: &str = "sonar";

const ENV_VAR: &str = "PERPLEXITY_API_KEY";
const KEY_FILE: &str = "perp_api_key.txt";

const SYSTEM_PROMPT: &str =
    "You are a concise assistant for a university inbox. Answer plainly, \
     without markdown formatting.";

pub struct PerplexityClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl PerplexityClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Key from `PERPLEXITY_API_KEY` or `~/.sortify/perp_api_key.txt`.
    /// Perplexity keys start with `pplx-`; anything else is rejected early
    /// rather than burning retries on 401s.
    pub fn from_env() -> Result<Self, AiError> {
        let key = resolve_api_key(ENV_VAR, KEY_FILE)
            .ok_or(AiError::MissingApiKey("perplexity", ENV_VAR))?;
        if !key.starts_with("pplx-") {
            log::warn!("perplexity key does not start with pplx-, refusing it");
            return Err(AiError::MissingApiKey("perplexity", ENV_VAR));
        }
        Ok(Self::new(key))
    }

    fn request_once(&self, prompt: &str) -> Result<String, AiError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                Message {
                    role: "user".into(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: 200,
            temperature: 0.3,
        };

        let response = self
            .http
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json()?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        let text = clean_markdown(text.trim());
        if text.is_empty() {
            return Err(AiError::EmptyResponse("perplexity"));
        }
        Ok(text)
    }
}

impl TextGenerator for PerplexityClient {
    fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let mut last_err = None;
        for attempt in 1..=self.retry.max_attempts {
            match self.request_once(prompt) {
                Ok(text) => return Ok(text),
                Err(AiError::Api { status, message }) => {
                    let code = reqwest::StatusCode::from_u16(status)
                        .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR);
                    if !is_retryable_status(code) {
                        return Err(AiError::Api { status, message });
                    }
                    log::warn!(
                        "perplexity attempt {}/{} failed with {}",
                        attempt,
                        self.retry.max_attempts,
                        status
                    );
                    last_err = Some(AiError::Api { status, message });
                }
                Err(e) => return Err(e),
            }
            if attempt < self.retry.max_attempts {
                thread::sleep(self.retry.backoff(attempt));
            }
        }
        Err(last_err.unwrap_or(AiError::EmptyResponse("perplexity")))
    }

    fn name(&self) -> &'static str {
        "perplexity"
    }
}

/// The API ignores "no markdown" often enough that bold/italic markers get
/// stripped here.
fn clean_markdown(text: &str) -> String {
    text.replace("**", "").replace('*', "")
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: MessageOut,
}

#[derive(Deserialize, Default)]
struct MessageOut {
    #[serde(default)]
    content: String,
}
