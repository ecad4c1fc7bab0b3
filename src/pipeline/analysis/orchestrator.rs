use std::sync::Arc;

use super::aggregate::aggregate;
use super::completion::{CompletionClient, CompletionRequest};
use super::groq::GroqClient;
use super::parser::{parse_analysis_response, ParseOutcome};
use super::prompt::{build_analysis_request, build_repair_request};
use super::retry::RetryPolicy;
use super::types::{DocumentInput, FraudAnalysisResult};
use super::validation::ValidatedAnalysis;
use super::AnalysisError;
use crate::config::{AnalyzerConfig, ConfigError};
use crate::pipeline::rate_limit::RateLimiter;

/// Default number of repair requests after a malformed response.
pub const DEFAULT_REPAIR_RETRIES: usize = 2;

/// Runs the single-document pipeline:
/// validate → prompt → completion → parse (+ repair) → aggregate.
///
/// Stateless between calls; cloning is cheap and clones share the completion
/// client (and its rate limiter).
#[derive(Clone)]
pub struct FraudAnalyzer {
    client: CompletionClient,
    max_repair_retries: usize,
}

impl FraudAnalyzer {
    pub fn new(client: CompletionClient, max_repair_retries: usize) -> Self {
        Self {
            client,
            max_repair_retries,
        }
    }

    /// Wire the HTTP completion service, retry policy, and a rate limiter
    /// from configuration.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_requests,
            config.rate_limit_window(),
        ));
        Self::from_config_with_limiter(config, limiter)
    }

    /// Same as `from_config`, sharing an existing rate limiter.
    pub fn from_config_with_limiter(
        config: &AnalyzerConfig,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = GroqClient::new(
            &config.api_base_url,
            &config.api_key,
            config.request_timeout_secs,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let retry = RetryPolicy::new(
            config.max_attempts,
            config.backoff_base(),
            config.backoff_max(),
        );
        let client = CompletionClient::new(
            Arc::new(transport),
            &config.model,
            config.temperature,
            retry,
        )
        .with_rate_limiter(limiter);

        Ok(Self::new(client, config.max_repair_retries))
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub fn completion_client(&self) -> &CompletionClient {
        &self.client
    }

    /// Analyze one document, blocking the calling thread. Input is validated
    /// before any network call.
    pub fn analyze(&self, input: &DocumentInput) -> Result<FraudAnalysisResult, AnalysisError> {
        let _span = tracing::info_span!(
            "analyze_document",
            document = input.name.as_deref().unwrap_or("unnamed"),
            length = input.text.chars().count()
        )
        .entered();

        let request = build_analysis_request(input)?;
        let analysis = self.complete_validated(&request)?;
        let result = aggregate(analysis, input, self.client.model());

        tracing::info!(
            risk_level = %result.risk_level(),
            flags = result.flags().len(),
            total_flagged_amount = result.total_flagged_amount(),
            "Document analysis complete"
        );
        Ok(result)
    }

    /// Non-blocking equivalent of `analyze`.
    pub async fn analyze_async(
        &self,
        input: DocumentInput,
    ) -> Result<FraudAnalysisResult, AnalysisError> {
        let analyzer = self.clone();
        tokio::task::spawn_blocking(move || analyzer.analyze(&input))
            .await
            .map_err(|e| AnalysisError::TaskFailed(e.to_string()))?
    }

    /// Call the service and parse, issuing up to `max_repair_retries` repair
    /// requests for malformed output.
    fn complete_validated(
        &self,
        request: &CompletionRequest,
    ) -> Result<ValidatedAnalysis, AnalysisError> {
        let mut raw = self.client.complete(request)?;
        let mut repairs = 0;

        loop {
            let (raw_text, violations) = match parse_analysis_response(&raw) {
                ParseOutcome::Valid(analysis) => return Ok(analysis),
                ParseOutcome::Malformed {
                    raw_text,
                    violations,
                } => (raw_text, violations),
            };

            if repairs >= self.max_repair_retries {
                tracing::error!(
                    attempts = repairs + 1,
                    violations = ?violations,
                    "Completion output still malformed after repair retries"
                );
                return Err(AnalysisError::SchemaValidation {
                    attempts: repairs + 1,
                    violations,
                    raw_response: raw_text,
                });
            }

            repairs += 1;
            tracing::warn!(
                repair = repairs,
                max_repairs = self.max_repair_retries,
                violations = ?violations,
                "Completion output malformed, requesting repair"
            );
            raw = self.client.complete(&build_repair_request(&raw_text, &violations))?;
        }
    }
}
