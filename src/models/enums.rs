use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Regularity {
    Regular => "regular",
    Prn => "prn",
    LimitedDuration => "limited_duration",
    Stopped => "stopped",
});

str_enum!(ComplianceStatus {
    Good => "good",
    Moderate => "moderate",
    Poor => "poor",
    NonAdherent => "non_adherent",
});

str_enum!(Priority {
    High => "high",
    Medium => "medium",
    Low => "low",
});

str_enum!(ReviewStep {
    Upload => "upload",
    PatientInfo => "patient_info",
    MedicationsReview => "medications_review",
    Interview => "interview",
    Recommendations => "recommendations",
    FinalReview => "final_review",
});

str_enum!(Watermark {
    Draft => "draft",
    Final => "final",
});

str_enum!(TemplateKind {
    FormFillable => "form_fillable",
    MergeField => "merge_field",
});

str_enum!(Severity {
    Blocking => "blocking",
    Informational => "informational",
});

str_enum!(FieldOrigin {
    Extracted => "extracted",
    UserEdited => "user_edited",
});

str_enum!(PageFormat {
    A4 => "a4",
    Letter => "letter",
});

impl Default for Regularity {
    fn default() -> Self {
        Self::Regular
    }
}

impl Default for ComplianceStatus {
    fn default() -> Self {
        Self::Good
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl Default for FieldOrigin {
    fn default() -> Self {
        Self::Extracted
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::Draft
    }
}

impl Default for PageFormat {
    fn default() -> Self {
        Self::A4
    }
}

impl Regularity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Regular => "Regular",
            Self::Prn => "PRN (as required)",
            Self::LimitedDuration => "Limited duration",
            Self::Stopped => "Stopped",
        }
    }
}

impl ComplianceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::Poor => "Poor",
            Self::NonAdherent => "Non-adherent",
        }
    }
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl Watermark {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Final => "FINAL",
        }
    }
}

impl ReviewStep {
    /// Wizard order, first to last.
    pub const ORDER: [ReviewStep; 6] = [
        ReviewStep::Upload,
        ReviewStep::PatientInfo,
        ReviewStep::MedicationsReview,
        ReviewStep::Interview,
        ReviewStep::Recommendations,
        ReviewStep::FinalReview,
    ];

    pub fn position(&self) -> usize {
        match self {
            Self::Upload => 0,
            Self::PatientInfo => 1,
            Self::MedicationsReview => 2,
            Self::Interview => 3,
            Self::Recommendations => 4,
            Self::FinalReview => 5,
        }
    }

    pub fn next(&self) -> Option<ReviewStep> {
        Self::ORDER.get(self.position() + 1).copied()
    }

    pub fn previous(&self) -> Option<ReviewStep> {
        self.position().checked_sub(1).map(|i| Self::ORDER[i])
    }
}

impl PageFormat {
    /// Page size in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (f32, f32) {
        match self {
            Self::A4 => (210.0, 297.0),
            Self::Letter => (215.9, 279.4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn round_trips_through_str() {
        for step in ReviewStep::ORDER {
            assert_eq!(ReviewStep::from_str(step.as_str()).unwrap(), step);
        }
        assert_eq!(Regularity::from_str("prn").unwrap(), Regularity::Prn);
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = Priority::from_str("urgent").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn serde_uses_storage_names() {
        let json = serde_json::to_string(&ComplianceStatus::NonAdherent).unwrap();
        assert_eq!(json, "\"non_adherent\"");
        let back: ComplianceStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ComplianceStatus::NonAdherent);
    }

    #[test]
    fn step_order_is_linear() {
        assert_eq!(ReviewStep::Upload.previous(), None);
        assert_eq!(ReviewStep::Upload.next(), Some(ReviewStep::PatientInfo));
        assert_eq!(ReviewStep::FinalReview.next(), None);
        assert_eq!(
            ReviewStep::FinalReview.previous(),
            Some(ReviewStep::Recommendations)
        );
    }
}
