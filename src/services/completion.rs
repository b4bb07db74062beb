//! Client for the hosted text-completion service used by the coaching summary.

use std::{env, sync::Arc};

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Failures reported by a [`CompletionClient`].
#[derive(Debug, Error)]
pub enum CompletionError {
    /// No API key configured on the server.
    #[error("completion service is not configured")]
    NotConfigured,
    /// The service rejected the API key.
    #[error("completion service rejected the API key")]
    InvalidApiKey,
    /// The account ran out of credits.
    #[error("completion service quota exhausted: {message}")]
    QuotaExceeded {
        /// Message returned by the service.
        message: String,
    },
    /// Too many requests in a short period.
    #[error("completion service rate limit reached: {message}")]
    RateLimited {
        /// Message returned by the service.
        message: String,
    },
    /// Any other non-success status.
    #[error("completion service answered {status}: {message}")]
    Upstream {
        /// HTTP status returned.
        status: StatusCode,
        /// Message returned by the service.
        message: String,
    },
    /// The request could not be sent or the body could not be read.
    #[error("failed to reach completion service")]
    Transport {
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },
    /// The completion was empty, not JSON, or missing required keys.
    #[error("completion service returned an unusable report")]
    ResponseShape {
        /// What was wrong with the payload.
        reason: String,
        /// Raw completion text, when there was one.
        raw: Option<String>,
    },
}

impl CompletionError {
    /// Diagnostic text meant for non-production error payloads.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            CompletionError::ResponseShape { reason, raw } => Some(match raw {
                Some(raw) => format!("{reason}; raw completion: {raw}"),
                None => reason.clone(),
            }),
            CompletionError::Upstream { message, .. } => Some(message.clone()),
            CompletionError::Transport { source } => Some(source.to_string()),
            _ => None,
        }
    }
}

/// One JSON-mode completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// System instruction.
    pub system: String,
    /// User payload.
    pub user: String,
}

/// Single request/response text generation returning a JSON formatted string.
pub trait CompletionClient: Send + Sync {
    /// Send the prompt and return the raw completion text.
    fn complete_json(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<'static, Result<String, CompletionError>>;
}

/// [`CompletionClient`] speaking the OpenAI chat-completions protocol.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: Arc<str>,
    api_key: Arc<str>,
}

impl OpenAiClient {
    /// Create a client for `base_url` authenticated with `api_key`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: Arc::from(base_url.trim_end_matches('/')),
            api_key: Arc::from(api_key.into()),
        }
    }

    /// Build a client from `OPENAI_API_KEY` and `OPENAI_BASE_URL`; `None` when no key is set.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())?;
        let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        Some(Self::new(base_url, api_key))
    }

    async fn send(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": request.model,
            "temperature": request.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });

        debug!(model = %request.model, "requesting completion");
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.as_ref())
            .json(&body)
            .send()
            .await
            .map_err(|source| CompletionError::Transport { source })?;

        let status = response.status();
        if !status.is_success() {
            let payload = response.json::<ErrorEnvelope>().await.ok();
            let error = classify_failure(status, payload);
            warn!(%status, error = %error, "completion request failed");
            return Err(error);
        }

        let payload = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|source| CompletionError::Transport { source })?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| CompletionError::ResponseShape {
                reason: "completion is empty".into(),
                raw: None,
            })
    }
}

impl CompletionClient for OpenAiClient {
    fn complete_json(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<'static, Result<String, CompletionError>> {
        let client = self.clone();
        Box::pin(async move { client.send(request).await })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn classify_failure(status: StatusCode, payload: Option<ErrorEnvelope>) -> CompletionError {
    let detail = payload.unwrap_or_default().error;
    let quota_flagged = [detail.code.as_deref(), detail.kind.as_deref()]
        .into_iter()
        .flatten()
        .any(|value| value == "insufficient_quota");
    let message = detail
        .message
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_owned());

    match status {
        StatusCode::UNAUTHORIZED => CompletionError::InvalidApiKey,
        StatusCode::PAYMENT_REQUIRED => CompletionError::QuotaExceeded { message },
        StatusCode::TOO_MANY_REQUESTS if quota_flagged => {
            CompletionError::QuotaExceeded { message }
        }
        StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimited { message },
        _ if quota_flagged => CompletionError::QuotaExceeded { message },
        _ => CompletionError::Upstream { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(code: Option<&str>, message: &str) -> Option<ErrorEnvelope> {
        Some(ErrorEnvelope {
            error: ErrorDetail {
                message: Some(message.into()),
                kind: None,
                code: code.map(Into::into),
            },
        })
    }

    #[test]
    fn insufficient_quota_beats_rate_limit() {
        let err = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            envelope(Some("insufficient_quota"), "You exceeded your current quota"),
        );
        assert!(matches!(err, CompletionError::QuotaExceeded { .. }));

        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, envelope(None, "slow down"));
        assert!(matches!(err, CompletionError::RateLimited { .. }));
    }

    #[test]
    fn auth_and_payment_statuses_are_mapped() {
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, None),
            CompletionError::InvalidApiKey
        ));
        assert!(matches!(
            classify_failure(StatusCode::PAYMENT_REQUIRED, None),
            CompletionError::QuotaExceeded { .. }
        ));
        match classify_failure(StatusCode::INTERNAL_SERVER_ERROR, None) {
            CompletionError::Upstream { status, message } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message, "Internal Server Error");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
