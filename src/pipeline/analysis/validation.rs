// Schema validation for the analysis object returned by the completion service.
// Every violation is collected so a single repair request can name all of them.

use serde_json::{Map, Value};

use super::types::{FlagCategory, FraudFlag, RiskLevel, Severity};

/// Analysis that satisfied the schema, before aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAnalysis {
    pub risk_level: RiskLevel,
    pub summary: String,
    pub flags: Vec<FraudFlag>,
    pub recommendations: Vec<String>,
    /// Total the model reported; informational only, the aggregator recomputes it.
    pub reported_total: f64,
}

/// Validate a decoded JSON value against the analysis schema.
pub fn validate_analysis_value(value: &Value) -> Result<ValidatedAnalysis, Vec<String>> {
    let Some(root) = value.as_object() else {
        return Err(vec!["top-level value must be a JSON object".into()]);
    };

    let mut violations = Vec::new();

    let risk_level = required_str(root, "risk_level", &mut violations).and_then(|s| {
        s.parse::<RiskLevel>()
            .map_err(|_| {
                violations.push(format!(
                    "risk_level must be one of Low, Medium, High, got '{s}'"
                ))
            })
            .ok()
    });

    let summary = required_str(root, "summary", &mut violations).and_then(|s| {
        if s.trim().is_empty() {
            violations.push("summary must not be empty".into());
            None
        } else {
            Some(s.trim().to_string())
        }
    });

    let flags = match root.get("list_of_flags") {
        None | Some(Value::Null) => {
            violations.push("missing required field `list_of_flags`".into());
            None
        }
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| validate_flag(i, item, &mut violations))
                .collect::<Vec<_>>(),
        ),
        Some(_) => {
            violations.push("list_of_flags must be an array".into());
            None
        }
    };

    let recommendations = match root.get("recommendations") {
        None | Some(Value::Null) => {
            violations.push("missing required field `recommendations`".into());
            None
        }
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
                    Some(_) => {}
                    None => violations.push(format!("recommendations[{i}] must be a string")),
                }
            }
            Some(out)
        }
        Some(_) => {
            violations.push("recommendations must be an array of strings".into());
            None
        }
    };

    let reported_total = match root.get("total_flagged_amount") {
        None | Some(Value::Null) => {
            violations.push("missing required field `total_flagged_amount`".into());
            None
        }
        Some(v) => match v.as_f64() {
            Some(n) if n >= 0.0 => Some(n),
            Some(n) => {
                violations.push(format!("total_flagged_amount must be >= 0, got {n}"));
                None
            }
            None => {
                violations.push("total_flagged_amount must be a number".into());
                None
            }
        },
    };

    match (risk_level, summary, flags, recommendations, reported_total) {
        (Some(risk_level), Some(summary), Some(flags), Some(recommendations), Some(reported_total))
            if violations.is_empty() =>
        {
            Ok(ValidatedAnalysis {
                risk_level,
                summary,
                flags,
                recommendations,
                reported_total,
            })
        }
        _ => Err(violations),
    }
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    field: &str,
    violations: &mut Vec<String>,
) -> Option<&'a str> {
    match obj.get(field) {
        None | Some(Value::Null) => {
            violations.push(format!("missing required field `{field}`"));
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            violations.push(format!("{field} must be a string"));
            None
        }
    }
}

fn validate_flag(index: usize, item: &Value, violations: &mut Vec<String>) -> Option<FraudFlag> {
    let Some(obj) = item.as_object() else {
        violations.push(format!("list_of_flags[{index}] must be an object"));
        return None;
    };
    let before = violations.len();
    let mut scoped = Vec::new();

    let category = required_str(obj, "category", &mut scoped).and_then(|s| {
        s.parse::<FlagCategory>()
            .map_err(|_| {
                scoped.push(format!(
                    "category must be one of duplicate_payment, inflated_cost, missing_approval, suspicious_vendor, policy_violation, other, got '{s}'"
                ))
            })
            .ok()
    });

    let severity = required_str(obj, "severity", &mut scoped).and_then(|s| {
        s.parse::<Severity>()
            .map_err(|_| scoped.push(format!("severity must be one of low, medium, high, got '{s}'")))
            .ok()
    });

    let description = required_str(obj, "description", &mut scoped).map(str::to_string);
    let evidence = required_str(obj, "evidence", &mut scoped).map(str::to_string);

    let confidence = match obj.get("confidence") {
        None | Some(Value::Null) => {
            scoped.push("missing required field `confidence`".into());
            None
        }
        Some(v) => match v.as_f64() {
            Some(c) if (0.0..=1.0).contains(&c) => Some(c),
            Some(c) => {
                scoped.push(format!("confidence must be within [0, 1], got {c}"));
                None
            }
            None => {
                scoped.push("confidence must be a number".into());
                None
            }
        },
    };

    let amount_involved = match obj.get("amount_involved") {
        None | Some(Value::Null) => Some(None),
        Some(v) => match v.as_f64() {
            Some(a) if a >= 0.0 => Some(Some(a)),
            Some(a) => {
                scoped.push(format!("amount_involved must be >= 0, got {a}"));
                None
            }
            None => {
                scoped.push("amount_involved must be a number or null".into());
                None
            }
        },
    };

    violations.extend(
        scoped
            .into_iter()
            .map(|v| format!("list_of_flags[{index}]: {v}")),
    );
    if violations.len() > before {
        return None;
    }

    match (category, severity, description, evidence, confidence, amount_involved) {
        (Some(c), Some(s), Some(d), Some(e), Some(conf), Some(amount)) => {
            match FraudFlag::new(c, s, d, e, conf, amount) {
                Ok(flag) => Some(flag),
                Err(reason) => {
                    violations.push(format!("list_of_flags[{index}]: {reason}"));
                    None
                }
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "risk_level": "High",
            "summary": "Duplicate payments to ABC Corp.",
            "list_of_flags": [{
                "category": "duplicate_payment",
                "severity": "high",
                "description": "Same invoice paid twice",
                "evidence": "ABC Corp $9,999.00 2024-03-01",
                "confidence": 0.92,
                "amount_involved": 9999.0
            }],
            "recommendations": ["Recover the duplicate payment"],
            "total_flagged_amount": 9999.0
        })
    }

    #[test]
    fn accepts_valid_analysis() {
        let analysis = validate_analysis_value(&valid()).unwrap();
        assert_eq!(analysis.risk_level, RiskLevel::High);
        assert_eq!(analysis.flags.len(), 1);
        assert_eq!(analysis.flags[0].category(), FlagCategory::DuplicatePayment);
        assert_eq!(analysis.reported_total, 9999.0);
    }

    #[test]
    fn amount_may_be_null_or_absent() {
        let mut value = valid();
        value["list_of_flags"][0]["amount_involved"] = Value::Null;
        let analysis = validate_analysis_value(&value).unwrap();
        assert_eq!(analysis.flags[0].amount_involved(), None);

        value["list_of_flags"][0]
            .as_object_mut()
            .unwrap()
            .remove("amount_involved");
        assert!(validate_analysis_value(&value).is_ok());
    }

    #[test]
    fn missing_summary_is_reported() {
        let mut value = valid();
        value.as_object_mut().unwrap().remove("summary");
        let violations = validate_analysis_value(&value).unwrap_err();
        assert_eq!(violations, vec!["missing required field `summary`".to_string()]);
    }

    #[test]
    fn missing_total_is_reported() {
        let value = json!({
            "risk_level": "Low",
            "summary": "Nothing unusual.",
            "list_of_flags": [],
            "recommendations": []
        });
        let violations = validate_analysis_value(&value).unwrap_err();
        assert_eq!(
            violations,
            vec!["missing required field `total_flagged_amount`".to_string()]
        );

        let mut value = valid();
        value["total_flagged_amount"] = Value::Null;
        assert!(validate_analysis_value(&value).is_err());
    }

    #[test]
    fn out_of_range_confidence_is_reported_with_index() {
        let mut value = valid();
        value["list_of_flags"][0]["confidence"] = json!(1.5);
        let violations = validate_analysis_value(&value).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].starts_with("list_of_flags[0]: confidence must be within [0, 1]"));
    }

    #[test]
    fn negative_amount_is_reported() {
        let mut value = valid();
        value["list_of_flags"][0]["amount_involved"] = json!(-10.0);
        let violations = validate_analysis_value(&value).unwrap_err();
        assert!(violations[0].contains("amount_involved must be >= 0"));
    }

    #[test]
    fn unknown_enums_are_reported() {
        let mut value = valid();
        value["risk_level"] = json!("Severe");
        value["list_of_flags"][0]["category"] = json!("embezzlement");
        value["list_of_flags"][0]["severity"] = json!("critical");
        let violations = validate_analysis_value(&value).unwrap_err();
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().any(|v| v.contains("risk_level must be one of")));
        assert!(violations.iter().any(|v| v.contains("category must be one of")));
        assert!(violations.iter().any(|v| v.contains("severity must be one of")));
    }

    #[test]
    fn enum_case_is_normalized() {
        let mut value = valid();
        value["risk_level"] = json!("medium");
        value["list_of_flags"][0]["severity"] = json!("HIGH");
        let analysis = validate_analysis_value(&value).unwrap();
        assert_eq!(analysis.risk_level, RiskLevel::Medium);
        assert_eq!(analysis.flags[0].severity(), Severity::High);
    }

    #[test]
    fn wrong_types_are_reported() {
        let value = json!({
            "risk_level": 3,
            "summary": "s",
            "list_of_flags": {},
            "recommendations": "do things"
        });
        let violations = validate_analysis_value(&value).unwrap_err();
        assert!(violations.contains(&"risk_level must be a string".to_string()));
        assert!(violations.contains(&"list_of_flags must be an array".to_string()));
        assert!(violations.contains(&"recommendations must be an array of strings".to_string()));
    }

    #[test]
    fn non_object_root_is_rejected() {
        let violations = validate_analysis_value(&json!([1, 2])).unwrap_err();
        assert_eq!(violations, vec!["top-level value must be a JSON object".to_string()]);
    }

    #[test]
    fn negative_reported_total_is_rejected() {
        let mut value = valid();
        value["total_flagged_amount"] = json!(-5);
        assert!(validate_analysis_value(&value).is_err());
    }
}
