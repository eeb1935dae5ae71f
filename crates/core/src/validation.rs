use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ConfigurationError;
use crate::model::{Question, RawQuestion, SessionConfig};

/// A question list paired with the configuration to run it under.
///
/// This is the shape of a question-set file; `config` may be omitted and
/// supplied by the caller instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub config: Option<SessionConfig>,
    pub questions: Vec<RawQuestion>,
}

/// Checks typed questions for a session.
///
/// # Errors
///
/// Returns `ConfigurationError::EmptyQuestionSet`, `DuplicateQuestionId` or
/// the first shape error from [`Question::check_shape`].
pub fn validate_questions(questions: &[Question]) -> Result<(), ConfigurationError> {
    if questions.is_empty() {
        return Err(ConfigurationError::EmptyQuestionSet);
    }
    let mut seen = HashSet::with_capacity(questions.len());
    for question in questions {
        question.check_shape()?;
        if !seen.insert(&question.id) {
            return Err(ConfigurationError::DuplicateQuestionId {
                id: question.id.clone(),
            });
        }
    }
    Ok(())
}

/// Converts raw questions and validates them together with `config`.
///
/// # Errors
///
/// Returns the first `ConfigurationError` found: an unrecognized type, a
/// malformed question, an empty list, or an invalid configuration.
pub fn prepare(
    raw: Vec<RawQuestion>,
    config: SessionConfig,
) -> Result<(Vec<Question>, SessionConfig), ConfigurationError> {
    let questions = raw
        .into_iter()
        .map(Question::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    validate_questions(&questions)?;
    let config = config.validate()?;
    Ok((questions, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, QuestionKind, SessionMode};

    fn question(id: &str) -> Question {
        Question::single(
            id,
            QuestionKind::AskAndAnswer,
            vec![AnswerOption::new("a", "A", true)],
        )
    }

    #[test]
    fn empty_set_is_rejected() {
        assert_eq!(
            validate_questions(&[]).unwrap_err(),
            ConfigurationError::EmptyQuestionSet
        );
        assert_eq!(
            prepare(Vec::new(), SessionConfig::lesson()).unwrap_err(),
            ConfigurationError::EmptyQuestionSet
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = validate_questions(&[question("q1"), question("q1")]).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateQuestionId { .. }));
    }

    #[test]
    fn grouped_kind_without_sub_questions_fails_the_set() {
        let flat = Question::single(
            "q2",
            QuestionKind::ConversationPiece,
            vec![AnswerOption::new("a", "A", true), AnswerOption::new("b", "B", false)],
        );
        let err = validate_questions(&[question("q1"), flat]).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::ExpectedSubQuestions { ref id, .. } if id.as_str() == "q2"
        ));
    }

    #[test]
    fn question_set_file_parses_and_prepares() {
        let json = r#"{
            "title": "Part 1 drill",
            "config": {"mode": "FINAL_TEST", "timeLimit": 90},
            "questions": [
                {"id": "q1", "type": "IMAGE_DESCRIPTION", "image": "p1.png",
                 "answers": [{"id": "a", "isCorrect": true}, {"id": "b"}]},
                {"id": "q2", "type": "FILL_IN_PARAGRAPH",
                 "questions": [{"id": "s1", "answers": [{"id": "x", "isCorrect": true}]}]}
            ]
        }"#;
        let set: QuestionSet = serde_json::from_str(json).unwrap();
        let config = set.config.clone().unwrap();
        let (questions, config) = prepare(set.questions, config).unwrap();

        assert_eq!(questions.len(), 2);
        assert_eq!(questions[1].kind, QuestionKind::FillInParagraph);
        assert_eq!(config.mode(), SessionMode::FinalTest);
    }

    #[test]
    fn bundled_demo_set_prepares() {
        let set: QuestionSet =
            serde_json::from_str(include_str!("../../../demos/toeic_sample.json")).unwrap();
        let config = set.config.clone().unwrap();
        let (questions, config) = prepare(set.questions, config).unwrap();

        assert_eq!(questions.len(), 5);
        assert!(questions[2].has_sub_questions());
        assert_eq!(config.time_limit_secs(), Some(600));
        assert!((config.pass_threshold() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_type_in_file_fails_preparation() {
        let json = r#"{"questions": [{"id": "q1", "type": "ESSAY", "answers": [{"id": "a"}]}]}"#;
        let set: QuestionSet = serde_json::from_str(json).unwrap();
        let err = prepare(set.questions, SessionConfig::lesson()).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownQuestionType { .. }));
    }
}
