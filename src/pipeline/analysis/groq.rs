use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::completion::{CompletionRequest, LlmClient};
use super::CompletionError;

/// Groq's OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Blocking HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct GroqClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GroqClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, CompletionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CompletionError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Request body for `/chat/completions`
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Response body from `/chat/completions`
#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient for GroqClient {
    fn complete(
        &self,
        model: &str,
        temperature: f32,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError> {
        let body = ChatCompletionRequest {
            model,
            temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else if e.is_connect() {
                    CompletionError::Transport(format!("cannot reach {}", self.base_url))
                } else {
                    CompletionError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status, body, retry_after));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .map_err(|e| CompletionError::MalformedEnvelope(e.to_string()))?;

        extract_content(parsed)
    }
}

fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Map a non-success HTTP status to an error class.
fn classify_status(status: u16, body: String, retry_after: Option<Duration>) -> CompletionError {
    match status {
        401 | 403 => CompletionError::Authentication(body),
        429 => CompletionError::RateLimited {
            retry_after,
            message: body,
        },
        400 if mentions_content_policy(&body) => CompletionError::ContentPolicy(body),
        408 | 500..=599 => CompletionError::Transport(format!("status {status}: {body}")),
        _ => CompletionError::Provider { status, body },
    }
}

fn mentions_content_policy(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("content_policy") || lower.contains("content_filter") || lower.contains("safety")
}

fn extract_content(parsed: ChatCompletionResponse) -> Result<String, CompletionError> {
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::MalformedEnvelope("response has no choices".into()))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(CompletionError::ContentPolicy(
            "completion stopped by the provider's content filter".into(),
        ));
    }

    choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| CompletionError::MalformedEnvelope("response message has no content".into()))
}
