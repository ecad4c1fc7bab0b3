use super::completion::CompletionRequest;
use super::types::DocumentInput;
use super::AnalysisError;

/// Minimum document length accepted for analysis (characters).
pub const MIN_DOCUMENT_CHARS: usize = 50;

/// Maximum document length accepted for analysis (characters).
pub const MAX_DOCUMENT_CHARS: usize = 100_000;

pub const AUDITOR_SYSTEM_PROMPT: &str = r#"
You are a senior public-sector financial auditor and forensic accountant with two
decades of experience investigating fraud, waste, and abuse in government spending.
You apply GAO auditing standards, procurement regulations, and anti-fraud controls.

Examine the document for these indicator categories:

1. duplicate_payment: same vendor, amount, date or description paid more than once;
   repeated invoice numbers; split payments that recombine into an earlier payment.
2. inflated_cost: prices well above market rate, unexplained increases, amounts set
   just below competitive-bidding thresholds, excessive unit costs.
3. missing_approval: no authorizing signature, pending or retroactive approval,
   self-approval, payments above the approver's limit, missing purchase orders.
4. suspicious_vendor: PO-box-only addresses, vendors sharing addresses or phone
   numbers, look-alike vendor names, unvetted new vendors, unjustified sole source.
5. policy_violation: split purchases, waived competitive bids, misuse of emergency
   procurement, personal purchases, missing supporting documentation.
6. other: timing anomalies (weekend, holiday or year-end spikes) and documentation
   red flags (altered records, vague descriptions, incomplete vendor details).

Risk guidance:
- High: several indicators, amounts above $10,000, or evidence of intent.
- Medium: one or two indicators, or amounts between $1,000 and $10,000.
- Low: minor procedural issues or amounts under $1,000.

Quote the document verbatim in every evidence field. Report the dollar amount a
flag concerns in amount_involved when the document states one. Respond with a
single JSON object and nothing else.
"#;

pub const OUTPUT_SCHEMA_DESCRIPTION: &str = r#"{
  "risk_level": "Low | Medium | High",
  "summary": "2-3 sentence executive summary",
  "list_of_flags": [
    {
      "category": "duplicate_payment | inflated_cost | missing_approval | suspicious_vendor | policy_violation | other",
      "severity": "low | medium | high",
      "description": "what is wrong",
      "evidence": "verbatim quote from the document",
      "confidence": 0.0,
      "amount_involved": 0.0
    }
  ],
  "recommendations": ["highest priority action first"],
  "total_flagged_amount": 0.0
}

Constraints: every field above is required except amount_involved, which may be
null or omitted. confidence is a number within [0, 1]. amount_involved and
total_flagged_amount are numbers >= 0."#;

/// Check document text against the accepted length window.
pub fn validate_document_text(text: &str) -> Result<(), AnalysisError> {
    if text.trim().is_empty() {
        return Err(AnalysisError::InputValidation(
            "Document text cannot be empty".into(),
        ));
    }
    let length = text.chars().count();
    if length < MIN_DOCUMENT_CHARS {
        return Err(AnalysisError::InputValidation(format!(
            "Document text too short ({length} chars). Minimum {MIN_DOCUMENT_CHARS} characters required."
        )));
    }
    if length > MAX_DOCUMENT_CHARS {
        return Err(AnalysisError::InputValidation(format!(
            "Document text too long ({length} chars). Maximum {MAX_DOCUMENT_CHARS} characters allowed."
        )));
    }
    Ok(())
}

/// Build the completion request for a document. Same input, same request.
pub fn build_analysis_request(input: &DocumentInput) -> Result<CompletionRequest, AnalysisError> {
    validate_document_text(&input.text)?;

    let mut labels = String::new();
    if let Some(name) = &input.name {
        labels.push_str(&format!("Document name: {name}\n"));
    }
    if let Some(kind) = &input.document_type {
        labels.push_str(&format!("Document type: {kind}\n"));
    }

    let user = format!(
        r#"Analyze the following financial document for fraud, waste, and abuse.
{labels}
<document>
{text}
</document>

Instructions:
1. Review every transaction, vendor, amount, date, and approval.
2. Report every indicator you find, each with verbatim evidence.
3. Assess the overall risk level.
4. List actionable recommendations, highest impact first.

Return a JSON object with exactly this structure:
{OUTPUT_SCHEMA_DESCRIPTION}
"#,
        text = input.text,
    );

    Ok(CompletionRequest {
        system: AUDITOR_SYSTEM_PROMPT.trim().to_string(),
        user,
    })
}

/// Build a repair request asking the service to fix its previous output.
pub fn build_repair_request(malformed: &str, violations: &[String]) -> CompletionRequest {
    let listed = violations
        .iter()
        .map(|v| format!("- {v}"))
        .collect::<Vec<_>>()
        .join("\n");

    let user = format!(
        r#"Your previous response could not be accepted because it violated the required schema:
{listed}

Previous response:
<response>
{malformed}
</response>

Return the corrected analysis as a single JSON object with exactly this structure and nothing else:
{OUTPUT_SCHEMA_DESCRIPTION}
"#
    );

    CompletionRequest {
        system: AUDITOR_SYSTEM_PROMPT.trim().to_string(),
        user,
    }
}
