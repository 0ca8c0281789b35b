//! Question and question-bank domain model.
//!
//! # Responsibility
//! - Define question types, question records and the per-role bank shape.
//! - Provide grouping and append-merge helpers used by import and storage.
//!
//! # Invariants
//! - `QuestionType` order is stable and drives display and sampling order.
//! - Every question in a bank is filed under its own `kind`.
//! - Choice questions always carry a non-empty option list.
//! - Question ids are unique across all buckets of one bank.

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Question identifier, unique within one role's bank.
pub type QuestionId = String;

const DEFAULT_DIFFICULTY: f64 = 1.0;

/// Question category. Declaration order is the canonical display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    FillBlank,
    ShortAnswer,
}

impl QuestionType {
    /// All types in canonical order.
    pub const ALL: [QuestionType; 5] = [
        QuestionType::SingleChoice,
        QuestionType::MultipleChoice,
        QuestionType::TrueFalse,
        QuestionType::FillBlank,
        QuestionType::ShortAnswer,
    ];

    /// Numeric code used by legacy import files (1..=5).
    pub fn code(self) -> u8 {
        match self {
            Self::SingleChoice => 1,
            Self::MultipleChoice => 2,
            Self::TrueFalse => 3,
            Self::FillBlank => 4,
            Self::ShortAnswer => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Display label shown to operators.
    pub fn label(self) -> &'static str {
        match self {
            Self::SingleChoice => "单选题",
            Self::MultipleChoice => "多选题",
            Self::TrueFalse => "判断题",
            Self::FillBlank => "填空题",
            Self::ShortAnswer => "简答题",
        }
    }

    /// Stable snake_case name, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleChoice => "single_choice",
            Self::MultipleChoice => "multiple_choice",
            Self::TrueFalse => "true_false",
            Self::FillBlank => "fill_blank",
            Self::ShortAnswer => "short_answer",
        }
    }

    /// Parses a snake_case name, a numeric code or a display label.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Self::from_code(code);
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == trimmed || kind.label() == trimmed)
    }

    /// Whether records of this type must carry options.
    pub fn requires_options(self) -> bool {
        matches!(self, Self::SingleChoice | Self::MultipleChoice)
    }
}

impl Display for QuestionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_difficulty() -> f64 {
    DEFAULT_DIFFICULTY
}

/// One question in a role's bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: QuestionId,
    /// Serialized as `type` to match import files.
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub title: String,
    /// Meaningful only for choice types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub answer: String,
    pub score: f64,
    /// Secondary display sort key; lower comes first.
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,
}

impl QuestionRecord {
    /// Creates a record with default difficulty and no options.
    pub fn new(
        id: impl Into<QuestionId>,
        kind: QuestionType,
        title: impl Into<String>,
        answer: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            options: None,
            answer: answer.into(),
            score,
            difficulty: DEFAULT_DIFFICULTY,
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate(&self) -> Result<(), QuestionValidationError> {
        if self.id.trim().is_empty() {
            return Err(QuestionValidationError::EmptyId);
        }
        if self.title.trim().is_empty() {
            return Err(QuestionValidationError::EmptyTitle(self.id.clone()));
        }
        if self.answer.trim().is_empty() {
            return Err(QuestionValidationError::EmptyAnswer(self.id.clone()));
        }
        if !self.score.is_finite() || self.score <= 0.0 {
            return Err(QuestionValidationError::NonPositiveScore {
                id: self.id.clone(),
                score: self.score,
            });
        }
        if !self.difficulty.is_finite() {
            return Err(QuestionValidationError::NonFiniteDifficulty(self.id.clone()));
        }
        if self.kind.requires_options() && self.options.as_ref().map_or(true, Vec::is_empty) {
            return Err(QuestionValidationError::MissingOptions {
                id: self.id.clone(),
                kind: self.kind,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuestionValidationError {
    EmptyId,
    EmptyTitle(QuestionId),
    EmptyAnswer(QuestionId),
    NonPositiveScore { id: QuestionId, score: f64 },
    NonFiniteDifficulty(QuestionId),
    /// Same id appears more than once in one bank.
    DuplicateId(QuestionId),
    MissingOptions { id: QuestionId, kind: QuestionType },
    /// Question stored under a bucket that does not match its own type.
    Misfiled {
        id: QuestionId,
        bucket: QuestionType,
        kind: QuestionType,
    },
}

impl Display for QuestionValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "question id cannot be empty"),
            Self::EmptyTitle(id) => write!(f, "question `{id}` has an empty title"),
            Self::EmptyAnswer(id) => write!(f, "question `{id}` has an empty answer"),
            Self::NonPositiveScore { id, score } => {
                write!(f, "question `{id}` score must be > 0, got {score}")
            }
            Self::NonFiniteDifficulty(id) => {
                write!(f, "question `{id}` difficulty must be a finite number")
            }
            Self::DuplicateId(id) => write!(f, "question id `{id}` appears more than once"),
            Self::MissingOptions { id, kind } => {
                write!(f, "question `{id}` of type {kind} requires options")
            }
            Self::Misfiled { id, bucket, kind } => {
                write!(f, "question `{id}` of type {kind} is filed under {bucket}")
            }
        }
    }
}

impl Error for QuestionValidationError {}

/// All questions of one role, partitioned by type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionBank(BTreeMap<QuestionType, Vec<QuestionRecord>>);

impl QuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups records by their own type, keeping input order within a type.
    pub fn from_questions(questions: impl IntoIterator<Item = QuestionRecord>) -> Self {
        let mut bank = Self::new();
        for question in questions {
            bank.push(question);
        }
        bank
    }

    /// Appends one record to the bucket of its own type.
    pub fn push(&mut self, question: QuestionRecord) {
        self.0.entry(question.kind).or_default().push(question);
    }

    /// Replaces the bucket for `kind`.
    pub fn insert(&mut self, kind: QuestionType, questions: Vec<QuestionRecord>) {
        self.0.insert(kind, questions);
    }

    pub fn questions(&self, kind: QuestionType) -> &[QuestionRecord] {
        self.0.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Concatenates every bucket of `incoming` after the matching bucket here.
    ///
    /// Buckets absent from `incoming` are left untouched. Incoming questions
    /// whose id is already present are skipped; returns how many were.
    pub fn append(&mut self, incoming: QuestionBank) -> usize {
        let mut seen: HashSet<QuestionId> = self
            .0
            .values()
            .flatten()
            .map(|question| question.id.clone())
            .collect();
        let mut skipped = 0;
        for (kind, questions) in incoming.0 {
            let bucket = self.0.entry(kind).or_default();
            for question in questions {
                if seen.insert(question.id.clone()) {
                    bucket.push(question);
                } else {
                    skipped += 1;
                }
            }
        }
        skipped
    }

    /// Total number of questions across all types.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// True when no type holds at least one question.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Types holding at least one question, in canonical order.
    pub fn populated_types(&self) -> impl Iterator<Item = QuestionType> + '_ {
        self.0
            .iter()
            .filter(|(_, questions)| !questions.is_empty())
            .map(|(kind, _)| *kind)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, QuestionType, Vec<QuestionRecord>> {
        self.0.iter()
    }

    pub fn validate(&self) -> Result<(), QuestionValidationError> {
        let mut seen = HashSet::new();
        for (bucket, questions) in &self.0 {
            for question in questions {
                if !seen.insert(question.id.as_str()) {
                    return Err(QuestionValidationError::DuplicateId(question.id.clone()));
                }
                if question.kind != *bucket {
                    return Err(QuestionValidationError::Misfiled {
                        id: question.id.clone(),
                        bucket: *bucket,
                        kind: question.kind,
                    });
                }
                question.validate()?;
            }
        }
        Ok(())
    }
}

impl From<BTreeMap<QuestionType, Vec<QuestionRecord>>> for QuestionBank {
    fn from(value: BTreeMap<QuestionType, Vec<QuestionRecord>>) -> Self {
        Self(value)
    }
}

impl<'a> IntoIterator for &'a QuestionBank {
    type Item = (&'a QuestionType, &'a Vec<QuestionRecord>);
    type IntoIter = btree_map::Iter<'a, QuestionType, Vec<QuestionRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{QuestionBank, QuestionRecord, QuestionType, QuestionValidationError};

    fn choice(id: &str) -> QuestionRecord {
        QuestionRecord::new(id, QuestionType::SingleChoice, "pick one", "A", 2.0)
            .with_options(["A", "B"])
    }

    #[test]
    fn parse_accepts_codes_labels_and_names() {
        assert_eq!(QuestionType::parse("3"), Some(QuestionType::TrueFalse));
        assert_eq!(QuestionType::parse(" 简答题 "), Some(QuestionType::ShortAnswer));
        assert_eq!(
            QuestionType::parse("fill_blank"),
            Some(QuestionType::FillBlank)
        );
        assert_eq!(QuestionType::parse("9"), None);
        assert_eq!(QuestionType::parse("essay"), None);
    }

    #[test]
    fn choice_question_without_options_is_rejected() {
        let question = QuestionRecord::new("q1", QuestionType::MultipleChoice, "t", "A", 1.0);
        assert!(matches!(
            question.validate(),
            Err(QuestionValidationError::MissingOptions { .. })
        ));
        assert!(choice("q2").validate().is_ok());
    }

    #[test]
    fn non_positive_or_nan_score_is_rejected() {
        let mut question = QuestionRecord::new("q1", QuestionType::FillBlank, "t", "a", 0.0);
        assert!(question.validate().is_err());
        question.score = f64::NAN;
        assert!(question.validate().is_err());
    }

    #[test]
    fn append_concatenates_matching_buckets_only() {
        let mut bank = QuestionBank::from_questions([
            choice("a1"),
            QuestionRecord::new("a2", QuestionType::ShortAnswer, "t", "a", 10.0),
        ]);
        let skipped = bank.append(QuestionBank::from_questions([choice("b1")]));
        assert_eq!(skipped, 0);

        let ids: Vec<_> = bank
            .questions(QuestionType::SingleChoice)
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a1", "b1"]);
        assert_eq!(bank.questions(QuestionType::ShortAnswer).len(), 1);
        assert_eq!(bank.len(), 3);
    }

    #[test]
    fn append_skips_ids_already_in_the_bank() {
        let mut bank = QuestionBank::from_questions([choice("a1"), choice("a2")]);
        let skipped = bank.append(QuestionBank::from_questions([
            choice("a2"),
            choice("a3"),
            QuestionRecord::new("a1", QuestionType::FillBlank, "t", "a", 1.0),
        ]));

        assert_eq!(skipped, 2);
        assert_eq!(bank.len(), 3);
        assert!(bank.questions(QuestionType::FillBlank).is_empty());
        assert!(bank.validate().is_ok());
    }

    #[test]
    fn repeated_id_fails_validation_across_buckets() {
        let bank = QuestionBank::from_questions([
            choice("q1"),
            QuestionRecord::new("q1", QuestionType::TrueFalse, "t", "true", 1.0),
        ]);
        assert_eq!(
            bank.validate(),
            Err(QuestionValidationError::DuplicateId("q1".to_string()))
        );
    }

    #[test]
    fn populated_types_skip_empty_buckets() {
        let mut bank = QuestionBank::from_questions([choice("q1")]);
        bank.insert(QuestionType::TrueFalse, Vec::new());
        let kinds: Vec<_> = bank.populated_types().collect();
        assert_eq!(kinds, vec![QuestionType::SingleChoice]);
    }

    #[test]
    fn misfiled_question_fails_validation() {
        let mut bank = QuestionBank::new();
        bank.insert(QuestionType::TrueFalse, vec![choice("x")]);
        assert!(matches!(
            bank.validate(),
            Err(QuestionValidationError::Misfiled { .. })
        ));
    }

    #[test]
    fn bank_serializes_as_type_keyed_map() {
        let bank = QuestionBank::from_questions([choice("q1")]);
        let json = serde_json::to_value(&bank).expect("bank should serialize");
        assert!(json.get("single_choice").is_some());
        let back: QuestionBank = serde_json::from_value(json).expect("bank should deserialize");
        assert_eq!(back, bank);
    }
}
