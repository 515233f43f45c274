//! Filling a custom template from the record through its field mapping.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::CanonicalRecord;
use crate::pipeline::path::{resolver, FieldPath};
use crate::pipeline::template::TemplateDescriptor;

/// A mapped field whose data path could not be served.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldFailure {
    pub field: String,
    pub data_path: String,
    pub message: String,
}

/// Text for every discovered field, plus what could not be filled.
#[derive(Debug, Default)]
pub struct FieldValues {
    pub values: BTreeMap<String, String>,
    pub unmapped: Vec<String>,
    pub failures: Vec<FieldFailure>,
}

/// Resolve each discovered field through its mapping. Unmapped fields,
/// missing values and unserviceable paths all become empty text.
pub fn field_values(record: &CanonicalRecord, descriptor: &TemplateDescriptor) -> FieldValues {
    let mut out = FieldValues::default();

    for field in &descriptor.discovered_fields {
        let Some(data_path) = descriptor.mapping.get(field) else {
            out.unmapped.push(field.clone());
            out.values.insert(field.clone(), String::new());
            continue;
        };

        let text = match FieldPath::parse(data_path)
            .and_then(|path| resolver::resolve_display(record, &path))
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    template_id = %descriptor.id,
                    field = %field,
                    data_path = %data_path,
                    error = %e,
                    "Template field left empty"
                );
                out.failures.push(FieldFailure {
                    field: field.clone(),
                    data_path: data_path.clone(),
                    message: e.to_string(),
                });
                String::new()
            }
        };
        out.values.insert(field.clone(), text);
    }

    out
}
