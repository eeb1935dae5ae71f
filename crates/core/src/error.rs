use thiserror::Error;

use crate::model::{QuestionId, QuestionKind};

/// Invalid session setup. Raised before any session state exists.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("question set is empty")]
    EmptyQuestionSet,

    #[error("question {id} has unknown type: {kind}")]
    UnknownQuestionType { id: QuestionId, kind: String },

    #[error("question {id} has neither answers nor sub-questions")]
    MissingAnswers { id: QuestionId },

    #[error("question {id} of type {kind} needs a flat answer list and no sub-questions")]
    ExpectedAnswers { id: QuestionId, kind: QuestionKind },

    #[error("question {id} of type {kind} needs sub-questions")]
    ExpectedSubQuestions { id: QuestionId, kind: QuestionKind },

    #[error("sub-question {sub} of question {id} has no answers")]
    SubQuestionWithoutAnswers { id: QuestionId, sub: QuestionId },

    #[error("{id} must flag exactly one correct answer, found {found}")]
    CorrectAnswerCount { id: QuestionId, found: usize },

    #[error("duplicate question id: {id}")]
    DuplicateQuestionId { id: QuestionId },

    #[error("final test mode requires a positive time limit")]
    MissingTimeLimit,

    #[error("warning thresholds must be greater than zero")]
    InvalidWarningThreshold,

    #[error("pass threshold must be within 0..=100, got {0}")]
    InvalidPassThreshold(f64),
}
