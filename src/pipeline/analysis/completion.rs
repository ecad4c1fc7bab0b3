use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::retry::RetryPolicy;
use super::CompletionError;
use crate::pipeline::rate_limit::RateLimiter;

/// System instruction plus user payload sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

/// One attempt against the completion service (allows mocking).
pub trait LlmClient: Send + Sync {
    fn complete(
        &self,
        model: &str,
        temperature: f32,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError>;
}

/// Completion client used by the pipeline: owns model settings, retries
/// transient failures with backoff, and takes a rate-limit slot before every
/// attempt when a limiter is attached.
#[derive(Clone)]
pub struct CompletionClient {
    llm: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
    limiter: Option<Arc<RateLimiter>>,
}

impl CompletionClient {
    pub fn new(llm: Arc<dyn LlmClient>, model: &str, temperature: f32, retry: RetryPolicy) -> Self {
        Self {
            llm,
            model: model.to_string(),
            temperature,
            retry,
            limiter: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// Blocking completion call. Must not run on an async executor thread;
    /// use `complete_async` there.
    pub fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let mut attempt: u32 = 1;
        loop {
            if let Some(limiter) = &self.limiter {
                limiter.acquire();
            }

            let error = match self.llm.complete(&self.model, self.temperature, request) {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };

            match self.retry.delay_for(attempt, &error) {
                Some(delay) => {
                    tracing::warn!(
                        model = %self.model,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Completion call failed, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                None => {
                    if error.is_retryable() {
                        tracing::error!(
                            model = %self.model,
                            attempts = attempt,
                            error = %error,
                            "Completion retries exhausted"
                        );
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Non-blocking equivalent of `complete`.
    pub async fn complete_async(
        &self,
        request: CompletionRequest,
    ) -> Result<String, CompletionError> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.complete(&request))
            .await
            .map_err(|e| CompletionError::Transport(format!("completion task failed: {e}")))?
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<String, CompletionError> + Send + Sync;

/// A call observed by `MockLlmClient`.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub temperature: f32,
    pub request: CompletionRequest,
    pub started_at: Instant,
}

/// Mock LLM client for testing. Answers from a fixed response, a script, or
/// a closure, and records every call.
pub struct MockLlmClient {
    responder: Box<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        let response = response.to_string();
        Self::from_fn(move |_| Ok(response.clone()))
    }

    /// Replies in order; the last reply repeats once the script runs out.
    pub fn sequence(replies: Vec<Result<String, CompletionError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::from_fn(move |_| {
            let mut queue = queue.lock().unwrap_or_else(|p| p.into_inner());
            match queue.len() {
                0 => Err(CompletionError::Transport("mock script is empty".into())),
                1 => queue[0].clone(),
                _ => queue
                    .pop_front()
                    .unwrap_or_else(|| Err(CompletionError::Transport("mock script is empty".into()))),
            }
        })
    }

    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, CompletionError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl LlmClient for MockLlmClient {
    fn complete(
        &self,
        model: &str,
        temperature: f32,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(RecordedCall {
                model: model.to_string(),
                temperature,
                request: request.clone(),
                started_at: Instant::now(),
            });
        (self.responder)(request)
    }
}
