use serde_json::Value;

/// Confidence levels assigned by the built-in extractor.
pub mod thresholds {
    /// A value whose shape looks wrong, or one read from an unparsed line.
    pub const LOW: f64 = 0.50;

    /// A value read from a clearly labelled line.
    pub const HIGH: f64 = 0.90;
}

/// Scores at or above this are read as percentages.
const PERCENT_FLOOR: f64 = 2.0;

/// Read an extractor-supplied confidence.
///
/// Absent or unreadable scores count as fully trusted (1.0). Percentages
/// (values in [2, 100]) are scaled down. Anything else is clamped to
/// [0, 1], so float noise just above 1.0 stays 1.0.
pub fn parse_confidence(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    match raw {
        Some(v) if v.is_finite() => {
            let scaled = if (PERCENT_FLOOR..=100.0).contains(&v) { v / 100.0 } else { v };
            scaled.clamp(0.0, 1.0)
        }
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_confidence_is_trusted() {
        assert_eq!(parse_confidence(None), 1.0);
        assert_eq!(parse_confidence(Some(&Value::Null)), 1.0);
        assert_eq!(parse_confidence(Some(&json!("n/a"))), 1.0);
        assert_eq!(parse_confidence(Some(&json!({"score": 2}))), 1.0);
    }

    #[test]
    fn numeric_confidence_is_kept() {
        assert_eq!(parse_confidence(Some(&json!(0.4))), 0.4);
        assert_eq!(parse_confidence(Some(&json!("0.65"))), 0.65);
    }

    #[test]
    fn percentages_and_out_of_range_are_folded() {
        assert_eq!(parse_confidence(Some(&json!(85))), 0.85);
        assert_eq!(parse_confidence(Some(&json!("40%"))), 0.4);
        assert_eq!(parse_confidence(Some(&json!(250))), 1.0);
        assert_eq!(parse_confidence(Some(&json!(-3))), 0.0);
    }

    #[test]
    fn scores_just_above_one_are_not_percentages() {
        assert_eq!(parse_confidence(Some(&json!(1.0000001))), 1.0);
        assert_eq!(parse_confidence(Some(&json!(1.5))), 1.0);
        assert_eq!(parse_confidence(Some(&json!("1.02"))), 1.0);
        assert_eq!(parse_confidence(Some(&json!(2))), 0.02);
    }
}
