//! The fixed set of data paths a template field may be mapped to.
//!
//! Derived from the record shape so every entry is serviceable by the
//! resolver. List entries are offered up to `MAX_INDEXED_ENTRIES`.

use std::sync::LazyLock;

use serde::Serialize;

use crate::models::{InterviewAssessment, MedicationEntry, PatientInfo, Recommendation};

pub const MAX_INDEXED_ENTRIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogueEntry {
    pub path: String,
    pub label: String,
    pub group: &'static str,
}

fn humanize(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

static CATALOGUE: LazyLock<Vec<CatalogueEntry>> = LazyLock::new(build);

fn build() -> Vec<CatalogueEntry> {
    let mut entries = Vec::new();

    for field in PatientInfo::FIELDS {
        entries.push(CatalogueEntry {
            path: format!("patient.{field}"),
            label: format!("Patient {}", humanize(field).to_lowercase()),
            group: "patient",
        });
    }
    for field in InterviewAssessment::FIELDS {
        entries.push(CatalogueEntry {
            path: format!("interview.{field}"),
            label: humanize(field),
            group: "interview",
        });
    }

    entries.push(CatalogueEntry {
        path: "medications".into(),
        label: "Medication list".into(),
        group: "medications",
    });
    for i in 0..MAX_INDEXED_ENTRIES {
        for field in MedicationEntry::FIELDS {
            entries.push(CatalogueEntry {
                path: format!("medications[{i}].{field}"),
                label: format!("Medication {} {}", i + 1, humanize(field).to_lowercase()),
                group: "medications",
            });
        }
    }

    entries.push(CatalogueEntry {
        path: "recommendations".into(),
        label: "Recommendation list".into(),
        group: "recommendations",
    });
    for i in 0..MAX_INDEXED_ENTRIES {
        for field in Recommendation::FIELDS {
            entries.push(CatalogueEntry {
                path: format!("recommendations[{i}].{field}"),
                label: format!("Recommendation {} {}", i + 1, humanize(field).to_lowercase()),
                group: "recommendations",
            });
        }
    }

    entries
}

/// All mappable data paths, in display order.
pub fn data_path_catalogue() -> &'static [CatalogueEntry] {
    &CATALOGUE
}

pub fn is_catalogued(path: &str) -> bool {
    data_path_catalogue().iter().any(|e| e.path == path)
}
