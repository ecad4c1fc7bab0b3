use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of fraud indicator a flag reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagCategory {
    DuplicatePayment,
    InflatedCost,
    MissingApproval,
    SuspiciousVendor,
    PolicyViolation,
    Other,
}

impl FlagCategory {
    pub const ALL: [FlagCategory; 6] = [
        Self::DuplicatePayment,
        Self::InflatedCost,
        Self::MissingApproval,
        Self::SuspiciousVendor,
        Self::PolicyViolation,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicatePayment => "duplicate_payment",
            Self::InflatedCost => "inflated_cost",
            Self::MissingApproval => "missing_approval",
            Self::SuspiciousVendor => "suspicious_vendor",
            Self::PolicyViolation => "policy_violation",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FlagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown flag category '{s}'"))
    }
}

/// Severity of a single flag. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("unknown severity '{s}'")),
        }
    }
}

/// Overall document risk. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("unknown risk level '{s}'")),
        }
    }
}

/// A single fraud indicator. Confidence stays within [0, 1] and the amount
/// involved is never negative; `FraudFlag::new` is the only way in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudFlag {
    category: FlagCategory,
    severity: Severity,
    description: String,
    evidence: String,
    confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount_involved: Option<f64>,
}

impl FraudFlag {
    pub fn new(
        category: FlagCategory,
        severity: Severity,
        description: impl Into<String>,
        evidence: impl Into<String>,
        confidence: f64,
        amount_involved: Option<f64>,
    ) -> Result<Self, String> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence must be within [0, 1], got {confidence}"));
        }
        if let Some(amount) = amount_involved {
            if !amount.is_finite() || amount < 0.0 {
                return Err(format!("amount_involved must be >= 0, got {amount}"));
            }
        }
        Ok(Self {
            category,
            severity,
            description: description.into(),
            evidence: evidence.into(),
            confidence,
            amount_involved,
        })
    }

    pub fn category(&self) -> FlagCategory {
        self.category
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn evidence(&self) -> &str {
        &self.evidence
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn amount_involved(&self) -> Option<f64> {
        self.amount_involved
    }
}

/// Document text plus the optional caller-supplied labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInput {
    pub text: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
}

impl DocumentInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            name: None,
            document_type: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMetadata {
    /// Length of the analyzed text in characters.
    pub document_length: usize,
    pub flags_count: usize,
    pub high_severity_count: usize,
    pub analysis_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
}

/// Final, aggregated analysis of one document. Built only by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudAnalysisResult {
    risk_level: RiskLevel,
    summary: String,
    list_of_flags: Vec<FraudFlag>,
    recommendations: Vec<String>,
    total_flagged_amount: f64,
    document_metadata: DocumentMetadata,
}

impl FraudAnalysisResult {
    pub(crate) fn new(
        risk_level: RiskLevel,
        summary: String,
        list_of_flags: Vec<FraudFlag>,
        recommendations: Vec<String>,
        total_flagged_amount: f64,
        document_metadata: DocumentMetadata,
    ) -> Self {
        Self {
            risk_level,
            summary,
            list_of_flags,
            recommendations,
            total_flagged_amount,
            document_metadata,
        }
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Flags sorted by severity, then confidence, both descending.
    pub fn flags(&self) -> &[FraudFlag] {
        &self.list_of_flags
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    pub fn total_flagged_amount(&self) -> f64 {
        self.total_flagged_amount
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.document_metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_levels_are_ordinal() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert_eq!(RiskLevel::Low.max(RiskLevel::High), RiskLevel::High);
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" medium ".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
        assert_eq!(
            "Duplicate Payment".parse::<FlagCategory>().unwrap(),
            FlagCategory::DuplicatePayment
        );
        assert!("fraudulent".parse::<FlagCategory>().is_err());
        assert!("critical".parse::<Severity>().is_err());
    }

    #[test]
    fn wire_vocabulary_serializes() {
        assert_eq!(
            serde_json::to_string(&FlagCategory::SuspiciousVendor).unwrap(),
            "\"suspicious_vendor\""
        );
        assert_eq!(serde_json::to_string(&Severity::Low).unwrap(), "\"low\"");
        assert_eq!(serde_json::to_string(&RiskLevel::Medium).unwrap(), "\"Medium\"");
    }

    #[test]
    fn flag_rejects_out_of_range_confidence() {
        let err = FraudFlag::new(FlagCategory::Other, Severity::Low, "d", "e", 1.2, None);
        assert!(err.unwrap_err().contains("confidence"));
        let err = FraudFlag::new(FlagCategory::Other, Severity::Low, "d", "e", f64::NAN, None);
        assert!(err.is_err());
    }

    #[test]
    fn flag_rejects_negative_amount() {
        let err = FraudFlag::new(FlagCategory::Other, Severity::Low, "d", "e", 0.5, Some(-1.0));
        assert!(err.unwrap_err().contains("amount_involved"));
    }

    #[test]
    fn flag_serializes_wire_shape() {
        let flag = FraudFlag::new(FlagCategory::InflatedCost, Severity::Medium, "d", "e", 0.4, None)
            .unwrap();
        let json = serde_json::to_value(&flag).unwrap();
        assert_eq!(json["category"], "inflated_cost");
        assert_eq!(json["severity"], "medium");
        assert!(json.get("amount_involved").is_none());
    }

    #[test]
    fn document_input_builder() {
        let input = DocumentInput::new("text").with_name("Q4 report").with_type("expenditure");
        assert_eq!(input.name.as_deref(), Some("Q4 report"));
        assert_eq!(input.document_type.as_deref(), Some("expenditure"));
    }
}
