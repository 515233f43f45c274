//! Template descriptors and their field mappings.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TemplateError;
use crate::models::enums::TemplateKind;
use crate::pipeline::path::catalogue::{data_path_catalogue, is_catalogued};

/// A custom template registered by a session, with its field mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    pub id: Uuid,
    pub owner_session: String,
    pub name: String,
    pub kind: TemplateKind,
    /// SHA-256 of the uploaded template bytes, hex encoded.
    pub source_sha256: String,
    pub discovered_fields: Vec<String>,
    /// Template field name → data path.
    pub mapping: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TemplateDescriptor {
    pub fn new(
        owner_session: &str,
        name: &str,
        kind: TemplateKind,
        source_sha256: String,
        discovered_fields: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_session: owner_session.to_string(),
            name: name.to_string(),
            kind,
            source_sha256,
            discovered_fields,
            mapping: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.discovered_fields.iter().any(|f| f == field)
    }

    /// Replace the discovered fields after a re-upload. Mappings of fields
    /// that survived are kept; the rest are pruned and returned.
    pub fn rediscover(&mut self, fields: Vec<String>, source_sha256: String) -> Vec<String> {
        let surviving: BTreeSet<&str> = fields.iter().map(String::as_str).collect();
        let pruned: Vec<String> = self
            .mapping
            .keys()
            .filter(|f| !surviving.contains(f.as_str()))
            .cloned()
            .collect();
        for field in &pruned {
            self.mapping.remove(field);
        }
        self.discovered_fields = fields;
        self.source_sha256 = source_sha256;
        self.updated_at = Utc::now();
        pruned
    }

    pub fn map(&mut self, field: &str, data_path: &str) -> Result<(), TemplateError> {
        if !self.has_field(field) {
            return Err(TemplateError::UnknownField(field.to_string()));
        }
        if !is_catalogued(data_path) {
            return Err(TemplateError::UnknownDataPath(data_path.to_string()));
        }
        self.mapping.insert(field.to_string(), data_path.to_string());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Returns whether a mapping was removed.
    pub fn unmap(&mut self, field: &str) -> bool {
        let removed = self.mapping.remove(field).is_some();
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn unmapped_fields(&self) -> Vec<String> {
        self.discovered_fields
            .iter()
            .filter(|f| !self.mapping.contains_key(f.as_str()))
            .cloned()
            .collect()
    }

    /// Every discovered field is mapped.
    pub fn is_complete(&self) -> bool {
        self.discovered_fields
            .iter()
            .all(|f| self.mapping.contains_key(f))
    }
}

// ═══════════════════════════════════════════════════════════
// Mapping suggestions
// ═══════════════════════════════════════════════════════════

const SUGGESTION_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingSuggestion {
    pub field: String,
    pub data_path: String,
    pub confidence: f32,
}

/// Synonyms folded onto the vocabulary used by data paths.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("doctor", &["gp"]),
    ("physician", &["gp"]),
    ("dob", &["date", "birth"]),
    ("birthdate", &["date", "birth"]),
    ("drug", &["medications"]),
    ("drugs", &["medications"]),
    ("meds", &["medications"]),
    ("medication", &["medications"]),
    ("medicine", &["medications"]),
    ("medicines", &["medications"]),
    ("recommendation", &["recommendations"]),
    ("recs", &["recommendations"]),
    ("tel", &["phone"]),
    ("telephone", &["phone"]),
    ("mobile", &["phone"]),
    ("mail", &["email"]),
    ("sex", &["gender"]),
    ("reviewer", &["pharmacist"]),
];

const FILLER: &[&str] = &["list", "the", "of", "field", "txt", "text"];

/// Splits `patientName`, `patient_name` and `Patient Name` alike.
fn tokens(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in text.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn canonical_tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in tokens(text) {
        if FILLER.contains(&word.as_str()) {
            continue;
        }
        match SYNONYMS.iter().find(|(from, _)| *from == word) {
            Some((_, to)) => out.extend(to.iter().map(|t| t.to_string())),
            None => out.push(word),
        }
    }
    out
}

/// "name" alone says little about which name is meant.
fn weight(token: &str) -> f32 {
    if token == "name" {
        0.5
    } else {
        1.0
    }
}

fn score(field_tokens: &[String], path_tokens: &[String]) -> f32 {
    let total: f32 = field_tokens.iter().map(|t| weight(t)).sum();
    if total == 0.0 {
        return 0.0;
    }
    let matched: f32 = field_tokens
        .iter()
        .filter(|t| path_tokens.contains(t))
        .map(|t| weight(t))
        .sum();
    matched / total
}

/// Best catalogue path for a template field name, if any is close enough.
pub fn suggest_for_field(field: &str) -> Option<MappingSuggestion> {
    let field_tokens = canonical_tokens(field);
    if field_tokens.is_empty() {
        return None;
    }

    let mut best: Option<(f32, usize, &str)> = None;
    for entry in data_path_catalogue() {
        let path_tokens = tokens(&entry.path);
        let s = score(&field_tokens, &path_tokens);
        if s < SUGGESTION_THRESHOLD {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_score, best_len, _)) => {
                s > best_score || (s == best_score && path_tokens.len() < best_len)
            }
        };
        if better {
            best = Some((s, path_tokens.len(), entry.path.as_str()));
        }
    }

    best.map(|(confidence, _, path)| MappingSuggestion {
        field: field.to_string(),
        data_path: path.to_string(),
        confidence,
    })
}

/// Suggestions for every unmapped field of a template.
pub fn suggest_mappings(descriptor: &TemplateDescriptor) -> Vec<MappingSuggestion> {
    descriptor
        .unmapped_fields()
        .iter()
        .filter_map(|f| suggest_for_field(f))
        .collect()
}
