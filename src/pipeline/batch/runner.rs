//! Concurrent batch analysis.
//!
//! Every document runs the full single-document pipeline on a blocking
//! worker while holding a `WorkerPool` permit. Permits are granted in input
//! order. The rate limiter lives inside the shared completion client, so all
//! workers draw from one budget. Failures stay in their own `BatchItemResult`.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use super::types::{BatchItem, BatchItemResult, BatchReport};
use crate::config::{AnalyzerConfig, ConfigError};
use crate::pipeline::analysis::{AnalysisError, FraudAnalyzer};

/// Bounds the number of documents in flight at once.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// A zero size is raised to one.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        Arc::clone(&self.permits).acquire_owned().await
    }
}

#[derive(Clone)]
pub struct BatchAnalyzer {
    analyzer: FraudAnalyzer,
    pool: WorkerPool,
}

impl BatchAnalyzer {
    pub fn new(analyzer: FraudAnalyzer, pool: WorkerPool) -> Self {
        Self { analyzer, pool }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, ConfigError> {
        let analyzer = FraudAnalyzer::from_config(config)?;
        Ok(Self::new(analyzer, WorkerPool::new(config.max_concurrency)))
    }

    pub fn analyzer(&self) -> &FraudAnalyzer {
        &self.analyzer
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Analyze every item. The report holds exactly one result per item, in
    /// input order, whatever order the documents finish in.
    pub async fn run(&self, items: Vec<BatchItem>) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            batch_id = %batch_id,
            documents = items.len(),
            workers = self.pool.size(),
            "Batch analysis started"
        );

        let mut document_ids = Vec::with_capacity(items.len());
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            document_ids.push(item.document_id);
            let permit = self.pool.acquire().await;
            let analyzer = self.analyzer.clone();
            let input = item.input;
            handles.push(tokio::spawn(async move {
                let _permit = permit
                    .map_err(|e| AnalysisError::TaskFailed(format!("worker pool closed: {e}")))?;
                analyzer.analyze_async(input).await
            }));
        }

        let outcomes = join_all(handles).await;

        let results: Vec<BatchItemResult> = document_ids
            .into_iter()
            .zip(outcomes)
            .map(|(document_id, joined)| {
                let outcome = joined
                    .unwrap_or_else(|e| Err(AnalysisError::TaskFailed(e.to_string())));
                if let Err(e) = &outcome {
                    tracing::warn!(
                        batch_id = %batch_id,
                        document_id = %document_id,
                        kind = ?e.kind(),
                        error = %e,
                        "Document analysis failed"
                    );
                }
                BatchItemResult::from_outcome(document_id, outcome)
            })
            .collect();

        let report = BatchReport {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            items: results,
        };

        tracing::info!(
            batch_id = %batch_id,
            successful = report.successful(),
            failed = report.failed(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Batch analysis finished"
        );
        report
    }

    /// Run a batch from synchronous code on a private runtime. Must not be
    /// called from inside a tokio runtime.
    pub fn run_blocking(&self, items: Vec<BatchItem>) -> std::io::Result<BatchReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.run(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::pipeline::analysis::completion::{CompletionClient, LlmClient, MockLlmClient};
    use crate::pipeline::analysis::retry::RetryPolicy;
    use crate::pipeline::analysis::{DocumentInput, ErrorKind};
    use crate::pipeline::rate_limit::RateLimiter;

    const VALID_RESPONSE: &str = r#"{
        "risk_level": "Low",
        "summary": "Single consulting invoice with approval on file.",
        "list_of_flags": [],
        "recommendations": ["Continue routine review"],
        "total_flagged_amount": 0
    }"#;

    fn document(n: usize) -> String {
        format!(
            "INVOICE {n}\nVendor: ABC Corp\nAmount: $1,200.00\nApproved by: J. Smith\nDescription: consulting services"
        )
    }

    fn batch(mock: &Arc<MockLlmClient>, workers: usize, limiter: Option<RateLimiter>) -> BatchAnalyzer {
        let llm: Arc<dyn LlmClient> = mock.clone();
        let mut client = CompletionClient::new(llm, "test-model", 0.1, RetryPolicy::immediate(3));
        if let Some(limiter) = limiter {
            client = client.with_rate_limiter(Arc::new(limiter));
        }
        BatchAnalyzer::new(FraudAnalyzer::new(client, 2), WorkerPool::new(workers))
    }

    #[tokio::test]
    async fn one_malformed_document_is_isolated() {
        let mock = Arc::new(MockLlmClient::from_fn(|request| {
            if request.user.contains("BROKEN") || request.user.contains("Previous response:") {
                Ok("I am unable to produce JSON today.".into())
            } else {
                Ok(VALID_RESPONSE.into())
            }
        }));
        let items: Vec<BatchItem> = (0..5)
            .map(|n| {
                let mut text = document(n);
                if n == 2 {
                    text.push_str("\nBROKEN");
                }
                BatchItem::from_text(format!("doc-{n}"), text)
            })
            .collect();

        let report = batch(&mock, 3, None).run(items).await;

        assert_eq!(report.len(), 5);
        assert_eq!(report.failed(), 1);
        let ids: Vec<&str> = report.items.iter().map(|i| i.document_id.as_str()).collect();
        assert_eq!(ids, vec!["doc-0", "doc-1", "doc-2", "doc-3", "doc-4"]);

        let broken = &report.items[2];
        assert!(!broken.success);
        let error = broken.error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::SchemaValidation);
        assert_eq!(
            error.diagnostic.as_deref(),
            Some("I am unable to produce JSON today.")
        );
        assert!(report.items[0].result.is_some());
        assert!(report.items[4].success);
    }

    #[tokio::test]
    async fn invalid_input_fails_only_its_item() {
        let mock = Arc::new(MockLlmClient::new(VALID_RESPONSE));
        let items = vec![
            BatchItem::from_text("good", document(1)),
            BatchItem::new("empty", DocumentInput::new("   ")),
            BatchItem::from_text("also-good", document(2)),
        ];
        let report = batch(&mock, 2, None).run(items).await;

        assert_eq!(report.successful(), 2);
        assert_eq!(
            report.items[1].error.as_ref().map(|e| e.kind),
            Some(ErrorKind::InputValidation)
        );
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn order_follows_input_not_completion() {
        let mock = Arc::new(MockLlmClient::from_fn(|request| {
            // Earlier documents answer slower.
            if request.user.contains("INVOICE 0") {
                std::thread::sleep(Duration::from_millis(60));
            } else if request.user.contains("INVOICE 1") {
                std::thread::sleep(Duration::from_millis(30));
            }
            Ok(VALID_RESPONSE.into())
        }));
        let items = (0..3)
            .map(|n| BatchItem::from_text(format!("doc-{n}"), document(n)))
            .collect();
        let report = batch(&mock, 3, None).run(items).await;

        let names: Vec<Option<&str>> = report
            .items
            .iter()
            .map(|i| i.result.as_ref().and_then(|r| r.metadata().document_name.as_deref()))
            .collect();
        assert_eq!(names, vec![Some("doc-0"), Some("doc-1"), Some("doc-2")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_worker_dispatches_in_input_order() {
        let mock = Arc::new(MockLlmClient::from_fn(|_| {
            std::thread::sleep(Duration::from_millis(5));
            Ok(VALID_RESPONSE.into())
        }));
        let items = (0..6)
            .map(|n| BatchItem::from_text(format!("doc-{n}"), document(n)))
            .collect();
        let report = batch(&mock, 1, None).run(items).await;
        assert_eq!(report.successful(), 6);

        let mut calls = mock.calls();
        calls.sort_by_key(|c| c.started_at);
        let dispatched: Vec<usize> = calls
            .iter()
            .filter_map(|c| (0..6).find(|n| c.request.user.contains(&format!("INVOICE {n}\n"))))
            .collect();
        assert_eq!(dispatched, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn worker_pool_bounds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mock = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            Arc::new(MockLlmClient::from_fn(move |_| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(25));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(VALID_RESPONSE.into())
            }))
        };
        let items = (0..6)
            .map(|n| BatchItem::from_text(format!("doc-{n}"), document(n)))
            .collect();
        let analyzer = batch(&mock, 2, None);
        let report = analyzer.run(items).await;

        assert_eq!(report.successful(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(analyzer.pool().available(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shared_limiter_caps_calls_per_window() {
        let window = Duration::from_millis(200);
        let mock = Arc::new(MockLlmClient::new(VALID_RESPONSE));
        let items = (0..10)
            .map(|n| BatchItem::from_text(format!("doc-{n}"), document(n)))
            .collect();
        let report = batch(&mock, 4, Some(RateLimiter::new(3, window)))
            .run(items)
            .await;
        assert_eq!(report.successful(), 10);

        let mut starts: Vec<_> = mock.calls().into_iter().map(|c| c.started_at).collect();
        starts.sort();
        assert_eq!(starts.len(), 10);
        // Any four consecutive calls span at least one window, less scheduling slack.
        let slack = Duration::from_millis(40);
        for pair in starts.windows(4) {
            assert!(pair[3].duration_since(pair[0]) + slack >= window);
        }
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_report() {
        let mock = Arc::new(MockLlmClient::new(VALID_RESPONSE));
        let report = batch(&mock, 2, None).run(Vec::new()).await;
        assert!(report.is_empty());
        assert!(report.finished_at >= report.started_at);
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn run_blocking_from_sync_code() {
        let mock = Arc::new(MockLlmClient::new(VALID_RESPONSE));
        let report = batch(&mock, 1, None)
            .run_blocking(vec![BatchItem::from_text("only", document(0))])
            .unwrap();
        assert_eq!(report.successful(), 1);
    }

    #[test]
    fn zero_sized_pool_is_raised_to_one() {
        assert_eq!(WorkerPool::new(0).size(), 1);
    }
}
