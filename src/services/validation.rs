// src/services/validation.rs
//! Maps field-level validation failures onto the error taxonomy.
//!
//! Priority, highest first:
//! 1. content-type violation -> `BadRequest` ("Content Type Should Be JSON")
//! 2. any missing field      -> `MissingMandatoryField [fields]`
//! 3. any malformed field    -> `InvalidFieldFormat [fields]`
//! 4. nothing classifiable   -> `BadRequest`

use crate::models::error::SnapError;

/// Where the offending field lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Header,
    Body,
}

/// What went wrong with a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Missing,
    InvalidFormat,
    ContentType,
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub location: Location,
    pub field: String,
    pub kind: ViolationKind,
}

impl FieldViolation {
    pub fn missing(location: Location, field: impl Into<String>) -> Self {
        Self { location, field: field.into(), kind: ViolationKind::Missing }
    }

    pub fn invalid(location: Location, field: impl Into<String>) -> Self {
        Self { location, field: field.into(), kind: ViolationKind::InvalidFormat }
    }

    pub fn content_type() -> Self {
        Self {
            location: Location::Header,
            field: "content-type".to_string(),
            kind: ViolationKind::ContentType,
        }
    }

    /// Field name as reported to the caller. Header names are title-cased
    /// (`x-external-id` -> `X-External-Id`); body fields keep their JSON name.
    pub fn display_name(&self) -> String {
        match self.location {
            Location::Header => title_case_header(&self.field),
            Location::Body => self.field.clone(),
        }
    }
}

/// Collapses a batch of violations into the single error to report.
pub fn classify(violations: &[FieldViolation]) -> SnapError {
    if violations.iter().any(|v| v.kind == ViolationKind::ContentType) {
        return SnapError::content_type();
    }

    let names_of = |kind: ViolationKind| -> Vec<String> {
        violations
            .iter()
            .filter(|v| v.kind == kind)
            .map(FieldViolation::display_name)
            .collect()
    };

    let missing = names_of(ViolationKind::Missing);
    if !missing.is_empty() {
        return SnapError::MissingMandatoryField(missing);
    }
    let invalid = names_of(ViolationKind::InvalidFormat);
    if !invalid.is_empty() {
        return SnapError::InvalidFieldFormat(invalid);
    }
    SnapError::BadRequest { reason: None }
}

fn title_case_header(name: &str) -> String {
    name.replace('_', "-")
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
