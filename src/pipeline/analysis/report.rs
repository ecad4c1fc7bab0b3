use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::types::FraudAnalysisResult;

const RULE_WIDTH: usize = 80;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Cannot write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot serialize analysis result: {0}")]
    Json(#[from] serde_json::Error),
}

/// Format a dollar amount with thousands separators and two decimals.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u128;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

fn category_heading(category: &str) -> String {
    category.replace('_', " ").to_uppercase()
}

/// Plain-text audit report for one analysis result.
pub fn render_summary_report(result: &FraudAnalysisResult) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "FRAUD DETECTION AUDIT REPORT");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);
    let _ = writeln!(out, "RISK LEVEL: {}", result.risk_level().as_str().to_uppercase());
    let _ = writeln!(
        out,
        "Total Flagged Amount: {}",
        format_currency(result.total_flagged_amount())
    );
    let _ = writeln!(out, "Number of Issues: {}", result.flags().len());
    let _ = writeln!(out);
    let _ = writeln!(out, "EXECUTIVE SUMMARY:");
    let _ = writeln!(out, "{}", result.summary());
    let _ = writeln!(out);
    let _ = writeln!(out, "DETAILED FINDINGS:");

    if result.flags().is_empty() {
        let _ = writeln!(out, "No issues found.");
    }
    for (i, flag) in result.flags().iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{}. {} - {} SEVERITY",
            i + 1,
            category_heading(flag.category().as_str()),
            flag.severity().as_str().to_uppercase()
        );
        let _ = writeln!(out, "   Description: {}", flag.description());
        let _ = writeln!(out, "   Evidence: {}", flag.evidence());
        let _ = writeln!(out, "   Confidence: {:.1}%", flag.confidence() * 100.0);
        let _ = writeln!(
            out,
            "   Amount: {}",
            format_currency(flag.amount_involved().unwrap_or(0.0))
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "RECOMMENDATIONS:");
    for (i, rec) in result.recommendations().iter().enumerate() {
        let _ = writeln!(out, "{}. {rec}", i + 1);
    }

    let meta = result.metadata();
    let _ = writeln!(out);
    let _ = writeln!(out, "{rule}");
    if let Some(name) = &meta.document_name {
        let _ = writeln!(out, "Document: {name}");
    }
    if let Some(kind) = &meta.document_type {
        let _ = writeln!(out, "Document Type: {kind}");
    }
    let _ = writeln!(
        out,
        "Document Length: {} characters | High Severity: {} | Model: {}",
        meta.document_length, meta.high_severity_count, meta.analysis_model
    );
    let _ = writeln!(out, "{rule}");
    out
}

/// Write the result as pretty-printed JSON.
pub fn export_json(result: &FraudAnalysisResult, path: &Path) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "Analysis result exported");
    Ok(())
}
