//! Validation error types

use std::fmt;

/// Validation error for domain models
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Field is empty when it shouldn't be
    Empty { field: &'static str },

    /// Field exceeds maximum length
    TooLong { field: &'static str, max: usize },

    /// String doesn't match required format (e.g., email)
    InvalidFormat { field: &'static str, reason: &'static str },

    /// Invalid enum variant
    InvalidVariant { field: &'static str, value: String },

    /// Numeric or date value outside its allowed range
    OutOfRange { field: &'static str, reason: String },

    /// Field required by another field's value is absent
    Missing { field: &'static str, reason: &'static str },

    /// Update carried no fields
    EmptyPatch { resource: &'static str },

    /// Value rejected by a database constraint
    Rejected { field: &'static str, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{} cannot be empty", field),
            Self::TooLong { field, max } => {
                write!(f, "{} exceeds maximum length of {} characters", field, max)
            }
            Self::InvalidFormat { field, reason } => {
                write!(f, "{}: {}", field, reason)
            }
            Self::InvalidVariant { field, value } => {
                write!(f, "invalid {} value: '{}'", field, value)
            }
            Self::OutOfRange { field, reason } => write!(f, "{} {}", field, reason),
            Self::Missing { field, reason } => write!(f, "{} is required {}", field, reason),
            Self::EmptyPatch { resource } => {
                write!(f, "{} update must change at least one field", resource)
            }
            Self::Rejected { field, reason } => write!(f, "{} rejected: {}", field, reason),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Trimmed, non-empty, length-bounded text.
pub(crate) fn bounded_text(
    field: &'static str,
    s: &str,
    max: usize,
) -> Result<String, ValidationError> {
    let trimmed = s.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }

    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }

    Ok(trimmed.to_owned())
}

/// Like [`bounded_text`], but blank input means "no value".
pub(crate) fn optional_text(
    field: &'static str,
    s: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match s.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => bounded_text(field, v, max).map(Some),
    }
}

pub(crate) fn positive(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::OutOfRange {
            field,
            reason: format!("must be greater than zero (got {})", value),
        });
    }
    Ok(value)
}

pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::OutOfRange {
            field,
            reason: format!("must not be negative (got {})", value),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ValidationError::TooLong {
            field: "farm name",
            max: 50,
        };
        assert_eq!(
            err.to_string(),
            "farm name exceeds maximum length of 50 characters"
        );

        let err = ValidationError::EmptyPatch { resource: "farm" };
        assert_eq!(err.to_string(), "farm update must change at least one field");
    }

    #[test]
    fn bounded_text_trims_and_limits() {
        assert_eq!(bounded_text("name", "  Kebun  ", 10).unwrap(), "Kebun");
        assert!(matches!(
            bounded_text("name", "   ", 10),
            Err(ValidationError::Empty { field: "name" })
        ));
        assert!(matches!(
            bounded_text("name", &"x".repeat(11), 10),
            Err(ValidationError::TooLong { max: 10, .. })
        ));
    }

    #[test]
    fn optional_text_treats_blank_as_none() {
        assert_eq!(optional_text("subtype", None, 5).unwrap(), None);
        assert_eq!(optional_text("subtype", Some("  "), 5).unwrap(), None);
        assert_eq!(
            optional_text("subtype", Some(" musang "), 10).unwrap(),
            Some("musang".to_owned())
        );
    }

    #[test]
    fn numeric_ranges() {
        assert!(positive("size", 1.5).is_ok());
        assert!(positive("size", 0.0).is_err());
        assert!(positive("size", f64::NAN).is_err());
        assert!(non_negative("amount", 0.0).is_ok());
        assert!(non_negative("amount", -0.01).is_err());
    }
}
