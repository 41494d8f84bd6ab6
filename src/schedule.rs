//! Cron evaluation: parsing, validation, human-readable descriptions and
//! next-trigger computation.
//!
//! Expressions have five fields (`minute hour day-of-month month day-of-week`)
//! or six with a leading seconds field. Everything is evaluated in UTC.

mod cron_expression;
mod description;
mod field;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub use cron_expression::{CronExpression, MAX_UPCOMING};
pub use field::{CronField, FieldKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("cron expression is empty")]
    Empty,
    #[error(
        "expected 5 fields (minute hour day-of-month month day-of-week) or 6 with a leading seconds field, found {0}"
    )]
    FieldCount(usize),
    #[error("{field} value {value} is out of range {min}-{max}")]
    OutOfRange {
        field: FieldKind,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("{field} field contains an unparseable token '{token}'")]
    InvalidToken { field: FieldKind, token: String },
    #[error("{field} field has a zero step in '{token}'")]
    ZeroStep { field: FieldKind, token: String },
    #[error("{field} range {start}-{end} runs backwards")]
    InvertedRange {
        field: FieldKind,
        start: u32,
        end: u32,
    },
    #[error(
        "day-of-month and day-of-week cannot both be restricted; set one of them to '*' or '?'"
    )]
    ConflictingDayFields,
    #[error("day-of-month {0} never occurs in the selected months")]
    ImpossibleDate(u32),
    #[error("schedule could not be evaluated: {0}")]
    Unsupported(String),
}

/// Result of validating an expression for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CronDescription {
    pub valid: bool,
    pub description: String,
}

/// Validates `expression` and describes it in plain English.
///
/// Never fails: a malformed expression yields `valid = false` and the reason
/// as the description.
pub fn validate_and_describe(expression: &str) -> CronDescription {
    match CronExpression::parse(expression) {
        Ok(parsed) => CronDescription {
            valid: true,
            description: parsed.describe(),
        },
        Err(e) => CronDescription {
            valid: false,
            description: e.to_string(),
        },
    }
}

/// The first instant strictly after `after` that satisfies `expression`.
///
/// Returns `None` for malformed expressions.
pub fn next_trigger(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    CronExpression::parse(expression)
        .ok()
        .and_then(|parsed| parsed.next_after(&after))
}
