//! Chat completion client with a grounding prompt and classified retries.
//!
//! The completion call is the most failure-prone edge of the answer pipeline,
//! so it carries the only explicit retry policy in the crate: transient
//! failures (timeouts, rate limiting) are retried on a short backoff
//! schedule, while authentication failures and other upstream errors fail
//! immediately without consuming the retry budget.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// System instruction constraining the model to the supplied excerpts.
const SYSTEM_PROMPT: &str = "You answer questions using only the provided document excerpts. \
If the excerpts do not contain the answer, say so explicitly instead of guessing. \
Cite the source labels you relied on.";

/// Request timeout applied to every completion call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

/// Delays between retry attempts for transient failures.
const BACKOFF_DELAYS: [Duration; 3] = [
    Duration::from_millis(400),
    Duration::from_secs(1),
    Duration::from_secs(2),
];

/// Errors raised while requesting a grounded answer.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Credentials were rejected; retrying cannot help.
    #[error("Completion provider rejected credentials ({status})")]
    Auth {
        /// HTTP status returned by the provider.
        status: StatusCode,
    },
    /// Every attempt was throttled by the provider.
    #[error("Completion provider rate limit persisted across {attempts} attempts")]
    RateLimitExhausted {
        /// Total number of attempts made, including the first.
        attempts: usize,
    },
    /// Every attempt timed out.
    #[error("Completion request timed out after {attempts} attempts")]
    TimedOut {
        /// Total number of attempts made, including the first.
        attempts: usize,
    },
    /// Provider returned an unexpected status code.
    #[error("Unexpected completion response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider response did not contain an answer.
    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),
}

/// Interface implemented by completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce an answer to `question` grounded in `context`.
    async fn complete(&self, question: &str, context: &str) -> Result<String, CompletionError>;
}

/// Outcome of a single completion attempt, before retry classification.
enum Attempt {
    Success(String),
    RateLimited { body: String },
    TimedOut,
    Fatal(CompletionError),
}

/// Completion client backed by an OpenAI-compatible chat endpoint.
pub struct OpenAiCompletionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    backoff: Vec<Duration>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiCompletionClient {
    /// Construct a completion client with the default timeout and backoff schedule.
    pub fn new(base_url: &str, api_key: Option<&str>, model: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            model: model.to_string(),
            backoff: BACKOFF_DELAYS.to_vec(),
        })
    }

    /// Replace the backoff schedule. Used by tests to avoid real sleeps.
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    async fn attempt(&self, question: &str, context: &str) -> Attempt {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Context:\n{context}\n\nQuestion: {question}")
                }
            ],
            "temperature": 0.2,
        });

        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) if error.is_timeout() => return Attempt::TimedOut,
            Err(error) => return Attempt::Fatal(CompletionError::Http(error)),
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Attempt::Fatal(CompletionError::Auth { status });
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(error) if error.is_timeout() => return Attempt::TimedOut,
            Err(error) => return Attempt::Fatal(CompletionError::Http(error)),
        };

        if status == StatusCode::TOO_MANY_REQUESTS || looks_rate_limited(status, &text) {
            return Attempt::RateLimited { body: text };
        }
        if !status.is_success() {
            return Attempt::Fatal(CompletionError::UnexpectedStatus { status, body: text });
        }

        match serde_json::from_str::<ChatResponse>(&text) {
            Ok(parsed) => match parsed.choices.into_iter().next() {
                Some(choice) => Attempt::Success(choice.message.content),
                None => Attempt::Fatal(CompletionError::MalformedResponse(
                    "empty choices array".to_string(),
                )),
            },
            Err(error) => Attempt::Fatal(CompletionError::MalformedResponse(error.to_string())),
        }
    }
}

/// Some gateways report throttling with a non-429 status but a recognizable body.
fn looks_rate_limited(status: StatusCode, body: &str) -> bool {
    !status.is_success() && body.to_ascii_lowercase().contains("rate limit")
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, question: &str, context: &str) -> Result<String, CompletionError> {
        let max_attempts = self.backoff.len() + 1;

        let mut rate_limited = false;
        for attempt_index in 0..max_attempts {
            if attempt_index > 0 {
                let delay = self.backoff[attempt_index - 1];
                tracing::debug!(
                    attempt = attempt_index + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying completion request"
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(question, context).await {
                Attempt::Success(answer) => return Ok(answer),
                Attempt::Fatal(error) => return Err(error),
                Attempt::RateLimited { body } => {
                    tracing::warn!(attempt = attempt_index + 1, body, "Completion rate limited");
                    rate_limited = true;
                }
                Attempt::TimedOut => {
                    tracing::warn!(attempt = attempt_index + 1, "Completion request timed out");
                }
            }
        }

        if rate_limited {
            Err(CompletionError::RateLimitExhausted {
                attempts: max_attempts,
            })
        } else {
            Err(CompletionError::TimedOut {
                attempts: max_attempts,
            })
        }
    }
}
