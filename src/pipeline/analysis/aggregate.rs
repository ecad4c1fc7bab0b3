//! Rule-based aggregation of validated model output into the final result.
//!
//! Risk floor, from flag count and total flagged amount:
//! - more than $10,000 or three or more flags: High
//! - one or two flags, or $1,000 to $10,000: Medium
//! - otherwise: no floor
//!
//! The final level is `max(reported, floor)`. Aggregation may raise the
//! model's level but never lowers it.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::types::{
    DocumentInput, DocumentMetadata, FlagCategory, FraudAnalysisResult, FraudFlag, RiskLevel,
    Severity,
};
use super::validation::ValidatedAnalysis;

pub const HIGH_RISK_AMOUNT: f64 = 10_000.0;
pub const MEDIUM_RISK_AMOUNT: f64 = 1_000.0;
pub const HIGH_RISK_FLAG_COUNT: usize = 3;

/// Sum of present `amount_involved` values. Absent amounts count as zero.
pub fn total_flagged_amount(flags: &[FraudFlag]) -> f64 {
    flags
        .iter()
        .filter_map(FraudFlag::amount_involved)
        .sum::<f64>()
        .max(0.0)
}

/// Drop flags repeating an earlier (category, evidence) pair. First one wins.
pub fn dedupe_flags(flags: Vec<FraudFlag>) -> Vec<FraudFlag> {
    let mut seen: HashSet<(FlagCategory, String)> = HashSet::with_capacity(flags.len());
    flags
        .into_iter()
        .filter(|f| seen.insert((f.category(), f.evidence().trim().to_string())))
        .collect()
}

/// Severity descending, then confidence descending. Stable for ties.
pub fn sort_flags(flags: &mut [FraudFlag]) {
    flags.sort_by(|a, b| {
        b.severity().cmp(&a.severity()).then_with(|| {
            b.confidence()
                .partial_cmp(&a.confidence())
                .unwrap_or(Ordering::Equal)
        })
    });
}

/// Minimum risk level implied by flag count and total amount.
pub fn risk_floor(flag_count: usize, total: f64) -> Option<RiskLevel> {
    if total > HIGH_RISK_AMOUNT || flag_count >= HIGH_RISK_FLAG_COUNT {
        Some(RiskLevel::High)
    } else if flag_count >= 1 || total >= MEDIUM_RISK_AMOUNT {
        Some(RiskLevel::Medium)
    } else {
        None
    }
}

pub fn final_risk_level(reported: RiskLevel, floor: Option<RiskLevel>) -> RiskLevel {
    floor.map_or(reported, |f| reported.max(f))
}

/// Build the immutable result for one document.
pub fn aggregate(
    analysis: ValidatedAnalysis,
    input: &DocumentInput,
    model: &str,
) -> FraudAnalysisResult {
    let mut flags = dedupe_flags(analysis.flags);
    sort_flags(&mut flags);

    let total = total_flagged_amount(&flags);
    let floor = risk_floor(flags.len(), total);
    let risk_level = final_risk_level(analysis.risk_level, floor);

    if risk_level != analysis.risk_level {
        tracing::info!(
            reported = %analysis.risk_level,
            final_level = %risk_level,
            flags = flags.len(),
            total_flagged_amount = total,
            "Risk level raised by rule floor"
        );
    }
    if (analysis.reported_total - total).abs() > 0.005 {
        tracing::debug!(
            reported_total = analysis.reported_total,
            computed_total = total,
            "Model-reported total differs from sum of flag amounts"
        );
    }

    let metadata = DocumentMetadata {
        document_length: input.text.chars().count(),
        flags_count: flags.len(),
        high_severity_count: flags
            .iter()
            .filter(|f| f.severity() == Severity::High)
            .count(),
        analysis_model: model.to_string(),
        document_name: input.name.clone(),
        document_type: input.document_type.clone(),
    };

    FraudAnalysisResult::new(
        risk_level,
        analysis.summary,
        flags,
        analysis.recommendations,
        total,
        metadata,
    )
}
