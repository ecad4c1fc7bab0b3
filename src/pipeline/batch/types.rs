use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::analysis::{AnalysisError, DocumentInput, FraudAnalysisResult, StructuredError};

/// One document submitted to a batch.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub document_id: String,
    pub input: DocumentInput,
}

impl BatchItem {
    pub fn new(document_id: impl Into<String>, input: DocumentInput) -> Self {
        Self {
            document_id: document_id.into(),
            input,
        }
    }

    /// Item whose document name defaults to its id.
    pub fn from_text(document_id: impl Into<String>, text: impl Into<String>) -> Self {
        let document_id = document_id.into();
        let input = DocumentInput::new(text).with_name(document_id.clone());
        Self { document_id, input }
    }
}

/// Outcome of one document. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemResult {
    pub document_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<FraudAnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
}

impl BatchItemResult {
    pub fn from_outcome(
        document_id: String,
        outcome: Result<FraudAnalysisResult, AnalysisError>,
    ) -> Self {
        match outcome {
            Ok(result) => Self {
                document_id,
                success: true,
                result: Some(result),
                error: None,
            },
            Err(e) => Self {
                document_id,
                success: false,
                result: None,
                error: Some(e.to_structured()),
            },
        }
    }
}

/// Results of a batch, in the order the documents were submitted.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<BatchItemResult>,
}

impl BatchReport {
    pub fn successful(&self) -> usize {
        self.items.iter().filter(|i| i.success).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.successful()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
