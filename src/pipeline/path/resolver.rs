use std::str::FromStr;

use serde_json::Value;

use super::{FieldPath, PathError};
use crate::models::enums::{ComplianceStatus, Priority, Regularity};
use crate::models::{CanonicalRecord, DATA_ROOTS};

fn record_to_value(record: &CanonicalRecord, path: &FieldPath) -> Result<Value, PathError> {
    serde_json::to_value(record).map_err(|e| PathError::InvalidValue {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Resolve a path for reading.
///
/// `Ok(None)` for an unknown top-level section or an index past the end
/// of a list. Errors only for paths the record shape can never satisfy.
pub fn resolve(record: &CanonicalRecord, path: &FieldPath) -> Result<Option<Value>, PathError> {
    if !DATA_ROOTS.contains(&path.root()) {
        return Ok(None);
    }

    let root = record_to_value(record, path)?;
    let mut current = &root;

    for seg in path.segments() {
        let map = match current {
            Value::Object(map) => map,
            _ => {
                return Err(PathError::NotAContainer {
                    path: path.to_string(),
                    segment: seg.name.clone(),
                })
            }
        };
        current = map.get(&seg.name).ok_or_else(|| PathError::UnknownField {
            path: path.to_string(),
            segment: seg.name.clone(),
        })?;

        if let Some(idx) = seg.index {
            let items = current.as_array().ok_or_else(|| PathError::NotAList {
                path: path.to_string(),
                segment: seg.name.clone(),
            })?;
            match items.get(idx) {
                Some(item) => current = item,
                None => return Ok(None),
            }
        }
    }

    Ok(Some(current.clone()))
}

/// Lenient read: malformed or unserviceable paths resolve to nothing.
pub fn get(record: &CanonicalRecord, path: &str) -> Option<Value> {
    let parsed = FieldPath::parse(path).ok()?;
    resolve(record, &parsed).ok().flatten()
}

/// Write `value` at `path`, returning a new record. The input is untouched.
///
/// Lists never grow through a path write; out-of-range indices fail.
pub fn set(record: &CanonicalRecord, path: &str, value: Value) -> Result<CanonicalRecord, PathError> {
    let parsed = FieldPath::parse(path)?;
    set_path(record, &parsed, value)
}

pub fn set_path(
    record: &CanonicalRecord,
    path: &FieldPath,
    value: Value,
) -> Result<CanonicalRecord, PathError> {
    if !DATA_ROOTS.contains(&path.root()) {
        return Err(PathError::UnknownField {
            path: path.to_string(),
            segment: path.root().to_string(),
        });
    }

    let mut root = record_to_value(record, path)?;
    let slot = navigate_mut(&mut root, path)?;
    *slot = value;

    serde_json::from_value(root).map_err(|e| PathError::InvalidValue {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn navigate_mut<'a>(root: &'a mut Value, path: &FieldPath) -> Result<&'a mut Value, PathError> {
    let mut current = root;

    for seg in path.segments() {
        let map = match current {
            Value::Object(map) => map,
            _ => {
                return Err(PathError::NotAContainer {
                    path: path.to_string(),
                    segment: seg.name.clone(),
                })
            }
        };
        let next = map.get_mut(&seg.name).ok_or_else(|| PathError::UnknownField {
            path: path.to_string(),
            segment: seg.name.clone(),
        })?;

        current = match seg.index {
            None => next,
            Some(idx) => match next {
                Value::Array(items) => {
                    let len = items.len();
                    match items.get_mut(idx) {
                        Some(item) => item,
                        None => {
                            return Err(PathError::IndexOutOfRange {
                                path: path.to_string(),
                                index: idx,
                                len,
                            })
                        }
                    }
                }
                _ => {
                    return Err(PathError::NotAList {
                        path: path.to_string(),
                        segment: seg.name.clone(),
                    })
                }
            },
        };
    }

    Ok(current)
}

/// Resolve and stringify for document output. Missing values become "".
pub fn resolve_display(record: &CanonicalRecord, path: &FieldPath) -> Result<String, PathError> {
    Ok(resolve(record, path)?
        .map(|v| display_value(path.leaf(), &v))
        .unwrap_or_default())
}

/// Human-readable text for a resolved value.
///
/// Choice codes become their labels, lists are comma-joined and
/// entries are summarised by name (medications) or issue (recommendations).
pub fn display_value(field: &str, value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => (if *b { "Yes" } else { "No" }).to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => format!("{}", f as i64),
            Some(f) => format!("{f:.2}"),
            None => n.to_string(),
        },
        Value::String(s) => choice_label(field, s)
            .map(str::to_string)
            .unwrap_or_else(|| s.clone()),
        Value::Array(items) => items
            .iter()
            .map(|item| display_value(field, item))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => {
            if map.contains_key("name") {
                ["name", "strength", "form"]
                    .iter()
                    .filter_map(|k| map.get(*k).and_then(Value::as_str))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            } else {
                map.get("issue")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            }
        }
    }
}

fn choice_label(field: &str, code: &str) -> Option<&'static str> {
    match field {
        "regularity" => Regularity::from_str(code).ok().map(|r| r.label()),
        "compliance_status" => ComplianceStatus::from_str(code).ok().map(|c| c.label()),
        "priority" => Priority::from_str(code).ok().map(|p| p.label()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MedicationEntry, Recommendation};
    use crate::pipeline::path::catalogue::data_path_catalogue;
    use serde_json::json;

    fn sample_record() -> CanonicalRecord {
        let mut record = CanonicalRecord::default();
        record.patient.name = "Jane Doe".into();
        record.patient.date_of_birth = "1950-01-01".into();
        record.medications = vec![
            MedicationEntry {
                name: "Metformin".into(),
                strength: "500 mg".into(),
                ..Default::default()
            },
            MedicationEntry {
                name: "Warfarin".into(),
                dosage: "2 mg".into(),
                ..Default::default()
            },
        ];
        record.recommendations = vec![Recommendation {
            issue: "Duplicate therapy".into(),
            action: "Cease one agent".into(),
            ..Default::default()
        }];
        record
    }

    #[test]
    fn get_reads_nested_and_indexed_values() {
        let record = sample_record();
        assert_eq!(get(&record, "patient.name"), Some(json!("Jane Doe")));
        assert_eq!(get(&record, "medications[1].dosage"), Some(json!("2 mg")));
        assert_eq!(get(&record, "medications[0].regularity"), Some(json!("regular")));
    }

    #[test]
    fn get_is_lenient_for_missing_things() {
        let record = sample_record();
        assert_eq!(get(&record, "medications[9].name"), None);
        assert_eq!(get(&record, "doctor.name"), None);
        assert_eq!(get(&record, "not a path"), None);
    }

    #[test]
    fn resolve_reports_unknown_nested_fields() {
        let record = sample_record();
        let path = FieldPath::parse("patient.shoe_size").unwrap();
        assert!(matches!(resolve(&record, &path), Err(PathError::UnknownField { .. })));

        let path = FieldPath::parse("patient[0]").unwrap();
        assert!(matches!(resolve(&record, &path), Err(PathError::NotAList { .. })));

        let path = FieldPath::parse("patient.name.first").unwrap();
        assert!(matches!(resolve(&record, &path), Err(PathError::NotAContainer { .. })));
    }

    #[test]
    fn set_then_get_round_trips() {
        let record = sample_record();
        for (path, value) in [
            ("patient.email", json!("jane@example.com")),
            ("medications[1].frequency", json!("nocte")),
            ("medications[0].compliance_status", json!("poor")),
            ("recommendations[0].priority", json!("high")),
            ("interview.smoking_status", json!("current smoker")),
        ] {
            let updated = set(&record, path, value.clone()).unwrap();
            assert_eq!(get(&updated, path), Some(value), "round trip failed for {path}");
        }
    }

    #[test]
    fn numeric_catalogue_paths_round_trip_exactly() {
        let record = sample_record();
        let numeric: Vec<&str> = data_path_catalogue()
            .iter()
            .map(|entry| entry.path.as_str())
            .filter(|path| matches!(get(&record, path), Some(Value::Number(_))))
            .collect();
        assert_eq!(numeric, ["medications[0].confidence", "medications[1].confidence"]);

        for path in numeric {
            for value in [json!(0.4), json!(0.05), json!(0.69), json!(0.123), json!(1.0)] {
                let updated = set(&record, path, value.clone()).unwrap();
                assert_eq!(get(&updated, path), Some(value), "round trip failed for {path}");
            }
        }
    }

    #[test]
    fn set_leaves_input_untouched() {
        let record = sample_record();
        let snapshot = record.clone();
        let updated = set(&record, "medications[0].name", json!("Metformin XR")).unwrap();
        assert_eq!(record, snapshot);
        assert_eq!(updated.medications[0].name, "Metformin XR");
    }

    #[test]
    fn set_out_of_range_is_an_error() {
        let record = sample_record();
        let err = set(&record, "medications[5].name", json!("Aspirin")).unwrap_err();
        assert_eq!(
            err,
            PathError::IndexOutOfRange {
                path: "medications[5].name".into(),
                index: 5,
                len: 2
            }
        );
    }

    #[test]
    fn set_rejects_unknown_roots_and_bad_values() {
        let record = sample_record();
        assert!(matches!(
            set(&record, "provenance.x", json!("y")),
            Err(PathError::UnknownField { .. })
        ));
        assert!(matches!(
            set(&record, "medications[0].regularity", json!("sometimes")),
            Err(PathError::InvalidValue { .. })
        ));
    }

    #[test]
    fn display_values_are_readable() {
        let record = sample_record();
        let show = |p: &str| resolve_display(&record, &FieldPath::parse(p).unwrap()).unwrap();
        assert_eq!(show("medications"), "Metformin 500 mg, Warfarin");
        assert_eq!(show("recommendations"), "Duplicate therapy");
        assert_eq!(show("medications[0].regularity"), "Regular");
        assert_eq!(show("medications[7].name"), "");
        assert_eq!(show("medications[0].confidence"), "1");
    }
}
