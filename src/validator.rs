// ✅ Row Validator - decides well-formed vs malformed for one raw CSV record
//
// A row is well-formed when every required column is present (non-null) and
// converts to its target type. Validation is a pure function: the caller
// decides what to do with an `Invalid` row.

use crate::entities::{Department, Employee, Entity, EntityKind, Job};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

// ============================================================================
// INVALID REASON
// ============================================================================

/// Why a row was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Invalid {
    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("field `{field}` is not an integer: {value:?}")]
    NotAnInteger { field: &'static str, value: String },

    #[error("field `{field}` is not a timestamp: {value:?}")]
    BadTimestamp { field: &'static str, value: String },

    #[error("line is not a CSV record: {0}")]
    Unparseable(String),
}

/// Values the CSV reader treats as missing, in addition to empty fields
const NULL_SENTINELS: &[&str] = &["NA", "N/A", "NULL", "null", "NaN", "nan", "None"];

/// Naive date-time layouts accepted for hire dates (no offset)
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

// ============================================================================
// VALIDATION
// ============================================================================

/// Validate one raw record of the given kind
///
/// # Arguments
/// * `fields` - Raw column values in source order
/// * `kind` - Which entity the row should become
///
/// # Returns
/// * `Ok(Entity)` - All required fields present and convertible
/// * `Err(Invalid)` - First problem found
pub fn validate<S: AsRef<str>>(fields: &[S], kind: EntityKind) -> Result<Entity, Invalid> {
    let columns = kind.columns();
    if fields.len() > columns.len() {
        return Err(Invalid::ColumnCount {
            expected: columns.len(),
            found: fields.len(),
        });
    }

    // Every required column must be non-null before any conversion
    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let value: Option<&str> = fields.get(i).map(|v| v.as_ref());
        match value.filter(|v| !is_null(v)) {
            Some(value) => values.push(value),
            None => return Err(Invalid::MissingField(*column)),
        }
    }

    let entity: Entity = match kind {
        EntityKind::Department => {
            Department::new(parse_integer("id", values[0])?, values[1]).into()
        }
        EntityKind::Job => Job::new(parse_integer("id", values[0])?, values[1]).into(),
        EntityKind::Employee => Employee::new(
            parse_integer("id", values[0])?,
            values[1],
            parse_timestamp("datetime", values[2])?,
            parse_integer("department_id", values[3])?,
            parse_integer("job_id", values[4])?,
        )
        .into(),
    };

    Ok(entity)
}

/// True when the raw value counts as null
pub fn is_null(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || NULL_SENTINELS.contains(&trimmed)
}

/// Parse an integer column
///
/// Integral decimal spellings ("3.0") are accepted because numeric columns
/// with gaps are often exported as floats. The text is read exactly: any
/// non-zero fraction or exponent is rejected, never rounded.
pub fn parse_integer(field: &'static str, value: &str) -> Result<i64, Invalid> {
    let not_an_integer = || Invalid::NotAnInteger {
        field,
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let integral = match trimmed.split_once('.') {
        Some((whole, fraction)) if fraction.bytes().all(|b| b == b'0') => whole,
        Some(_) => return Err(not_an_integer()),
        None => trimmed,
    };

    let digits = integral.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(integral);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(not_an_integer());
    }

    integral.parse::<i64>().map_err(|_| not_an_integer())
}

/// Parse a timestamp column
///
/// RFC 3339 values are normalized to UTC. Naive values are taken as-is and
/// date-only values get midnight.
pub fn parse_timestamp(field: &'static str, value: &str) -> Result<NaiveDateTime, Invalid> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_utc());
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt);
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| Invalid::BadTimestamp {
            field,
            value: value.to_string(),
        })
}

// ============================================================================
// TESTS
// ============================================================================
