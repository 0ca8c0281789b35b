//! Raw question import: parse and validate operator-supplied JSON.
//!
//! # Responsibility
//! - Turn a JSON array of raw questions into validated `QuestionRecord`s.
//! - Generate question ids; raw input never carries them.
//!
//! # Invariants
//! - Output records always pass `QuestionRecord::validate()`.
//! - The first invalid element aborts the whole import.
//! - Error positions are 1-based, matching what operators see in editors.

use crate::model::question::{QuestionRecord, QuestionType};
use serde::Deserialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(rename = "type")]
    kind: Option<Value>,
    title: Option<String>,
    options: Option<Vec<String>>,
    answer: Option<Value>,
    score: Option<Value>,
    difficulty: Option<f64>,
}

/// Rejection raised before a raw import reaches the repositories.
#[derive(Debug)]
pub enum ValidationError {
    Malformed(serde_json::Error),
    NotAnArray,
    Empty,
    MissingField {
        position: usize,
        field: &'static str,
    },
    UnknownType {
        position: usize,
        value: String,
    },
    InvalidScore {
        position: usize,
    },
    MissingOptions {
        position: usize,
        kind: QuestionType,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "question data is not valid JSON: {err}"),
            Self::NotAnArray => write!(f, "question data must be a JSON array"),
            Self::Empty => write!(f, "question list cannot be empty"),
            Self::MissingField { position, field } => {
                write!(f, "question #{position} is missing `{field}`")
            }
            Self::UnknownType { position, value } => {
                write!(f, "question #{position} has unknown type `{value}`")
            }
            Self::InvalidScore { position } => {
                write!(f, "question #{position} score must be a number greater than 0")
            }
            Self::MissingOptions { position, kind } => {
                write!(f, "question #{position} of type {kind} requires options")
            }
        }
    }
}

impl Error for ValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

/// Parses a JSON array of raw questions into validated records.
pub fn parse_questions(raw: &str) -> Result<Vec<QuestionRecord>, ValidationError> {
    let value: Value = serde_json::from_str(raw).map_err(ValidationError::Malformed)?;
    parse_question_values(value)
}

/// Same as [`parse_questions`] for an already decoded JSON value.
pub fn parse_question_values(value: Value) -> Result<Vec<QuestionRecord>, ValidationError> {
    let Value::Array(items) = value else {
        return Err(ValidationError::NotAnArray);
    };
    if items.is_empty() {
        return Err(ValidationError::Empty);
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| normalize_question(index + 1, item))
        .collect()
}

fn normalize_question(position: usize, item: Value) -> Result<QuestionRecord, ValidationError> {
    let raw: RawQuestion = serde_json::from_value(item).map_err(ValidationError::Malformed)?;

    let kind_value = raw.kind.ok_or(ValidationError::MissingField {
        position,
        field: "type",
    })?;
    let title = raw
        .title
        .filter(|title| !title.trim().is_empty())
        .ok_or(ValidationError::MissingField {
            position,
            field: "title",
        })?;
    let answer = raw
        .answer
        .and_then(answer_text)
        .ok_or(ValidationError::MissingField {
            position,
            field: "answer",
        })?;
    let kind = parse_kind(position, &kind_value)?;
    let score = raw
        .score
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|score| score.is_finite() && *score > 0.0)
        .ok_or(ValidationError::InvalidScore { position })?;

    let options = raw.options.filter(|options| !options.is_empty());
    if kind.requires_options() && options.is_none() {
        return Err(ValidationError::MissingOptions { position, kind });
    }

    let mut record = QuestionRecord::new(generate_question_id(), kind, title, answer, score);
    record.options = options;
    if let Some(difficulty) = raw.difficulty {
        record.difficulty = difficulty;
    }
    Ok(record)
}

fn parse_kind(position: usize, value: &Value) -> Result<QuestionType, ValidationError> {
    let parsed = match value {
        Value::Number(number) => number
            .as_u64()
            .and_then(|code| u8::try_from(code).ok())
            .and_then(QuestionType::from_code),
        Value::String(text) => QuestionType::parse(text),
        _ => None,
    };
    parsed.ok_or_else(|| ValidationError::UnknownType {
        position,
        value: value.to_string(),
    })
}

/// Accepts textual answers and scalar answers (e.g. `true` for true/false).
fn answer_text(value: Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text,
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.trim().is_empty()).then_some(text)
}

fn generate_question_id() -> String {
    format!("q_{}", Uuid::new_v4().simple())
}
