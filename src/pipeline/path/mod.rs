//! Dotted-path addressing into the canonical record.
//!
//! `patient.name`, `medications[2].dosage`, `recommendations`.
//! Reads are lenient (missing things resolve to nothing), writes are
//! strict (a write that cannot land is a `PathError`).

pub mod catalogue;
pub mod resolver;

pub use catalogue::*;
pub use resolver::*;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("Malformed path '{path}': {reason}")]
    Malformed { path: String, reason: String },

    #[error("Unknown field '{segment}' in path '{path}'")]
    UnknownField { path: String, segment: String },

    #[error("Index {index} out of range (len {len}) in path '{path}'")]
    IndexOutOfRange { path: String, index: usize, len: usize },

    #[error("Segment '{segment}' in path '{path}' is not a list")]
    NotAList { path: String, segment: String },

    #[error("Cannot descend into scalar '{segment}' in path '{path}'")]
    NotAContainer { path: String, segment: String },

    #[error("Invalid value for '{path}': {reason}")]
    InvalidValue { path: String, reason: String },
}

/// One path segment: a field name with an optional list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub index: Option<usize>,
}

/// A parsed dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let malformed = |reason: &str| PathError::Malformed {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.trim().is_empty() {
            return Err(malformed("empty path"));
        }

        let mut segments = Vec::new();
        for part in raw.split('.') {
            let (name, index) = match part.find('[') {
                Some(open) => {
                    let close = part
                        .strip_suffix(']')
                        .ok_or_else(|| malformed("unterminated index"))?;
                    let digits = &close[open + 1..];
                    let idx = digits
                        .parse::<usize>()
                        .map_err(|_| malformed("index must be a non-negative integer"))?;
                    (&part[..open], Some(idx))
                }
                None => (part, None),
            };

            let valid_name = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid_name {
                return Err(malformed("segment names are letters, digits and underscores"));
            }

            segments.push(Segment {
                name: name.to_string(),
                index,
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn root(&self) -> &str {
        &self.segments[0].name
    }

    /// The final field name (`dosage` in `medications[0].dosage`).
    pub fn leaf(&self) -> &str {
        self.segments
            .last()
            .map(|s| s.name.as_str())
            .unwrap_or_default()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_indexed_segments() {
        let path = FieldPath::parse("medications[2].dosage").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment { name: "medications".into(), index: Some(2) },
                Segment { name: "dosage".into(), index: None },
            ]
        );
        assert_eq!(path.root(), "medications");
        assert_eq!(path.leaf(), "dosage");
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["", "patient..name", "medications[", "medications[x]", "meds[-1]", "a b"] {
            assert!(
                matches!(FieldPath::parse(bad), Err(PathError::Malformed { .. })),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn display_is_original_text() {
        let path: FieldPath = "patient.name".parse().unwrap();
        assert_eq!(path.to_string(), "patient.name");
    }
}
