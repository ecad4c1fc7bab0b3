use std::sync::LazyLock;

use regex::Regex;

use super::validation::{validate_analysis_value, ValidatedAnalysis};

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid regex"));

/// Outcome of decoding one completion response. The service is an untrusted
/// text producer, so failure is an ordinary value here rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Valid(ValidatedAnalysis),
    Malformed {
        raw_text: String,
        violations: Vec<String>,
    },
}

impl ParseOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Decode and validate the service's raw text.
pub fn parse_analysis_response(raw: &str) -> ParseOutcome {
    let malformed = |violations: Vec<String>| ParseOutcome::Malformed {
        raw_text: raw.to_string(),
        violations,
    };

    let Some(json_str) = extract_json_object(raw) else {
        return malformed(vec!["response contains no JSON object".into()]);
    };

    let value: serde_json::Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) => return malformed(vec![format!("response is not valid JSON: {e}")]),
    };

    match validate_analysis_value(&value) {
        Ok(analysis) => ParseOutcome::Valid(analysis),
        Err(violations) => malformed(violations),
    }
}

/// Locate the JSON object in a response: a fenced block if present, else the
/// span from the first `{` to the last `}`.
fn extract_json_object(response: &str) -> Option<&str> {
    if let Some(inner) = FENCED_BLOCK.captures(response).and_then(|c| c.get(1)) {
        let inner = inner.as_str().trim();
        if inner.starts_with('{') {
            return Some(inner);
        }
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}
