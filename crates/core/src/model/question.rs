use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;
use crate::model::ids::{AnswerId, QuestionId};

//
// ─── QUESTION KIND ─────────────────────────────────────────────────────────────
//

/// The closed set of TOEIC-style item formats.
///
/// Single-answer kinds carry a flat answer list; grouped kinds carry
/// sub-questions that share one prompt, passage or recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    ImageDescription,
    AskAndAnswer,
    ConversationPiece,
    ShortTalk,
    FillInBlank,
    FillInParagraph,
    ReadAndUnderstand,
}

impl QuestionKind {
    pub const ALL: [QuestionKind; 7] = [
        QuestionKind::ImageDescription,
        QuestionKind::AskAndAnswer,
        QuestionKind::ConversationPiece,
        QuestionKind::ShortTalk,
        QuestionKind::FillInBlank,
        QuestionKind::FillInParagraph,
        QuestionKind::ReadAndUnderstand,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::ImageDescription => "IMAGE_DESCRIPTION",
            QuestionKind::AskAndAnswer => "ASK_AND_ANSWER",
            QuestionKind::ConversationPiece => "CONVERSATION_PIECE",
            QuestionKind::ShortTalk => "SHORT_TALK",
            QuestionKind::FillInBlank => "FILL_IN_BLANK",
            QuestionKind::FillInParagraph => "FILL_IN_PARAGRAPH",
            QuestionKind::ReadAndUnderstand => "READ_AND_UNDERSTAND",
        }
    }

    /// True for kinds scored through sub-questions.
    #[must_use]
    pub fn is_grouped(self) -> bool {
        matches!(
            self,
            QuestionKind::ConversationPiece
                | QuestionKind::ShortTalk
                | QuestionKind::FillInParagraph
                | QuestionKind::ReadAndUnderstand
        )
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a raw type string names no known kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown question type: {}", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for QuestionKind {
    type Err = UnknownKind;

    /// Accepts `FILL_IN_BLANK`, `fill-in-blank` and `fill_in_blank` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        QuestionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownKind(s.to_owned()))
    }
}

//
// ─── ANSWERS & SUB-QUESTIONS ───────────────────────────────────────────────────
//

/// One selectable option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: AnswerId,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "isCorrect")]
    pub is_correct: bool,
}

impl AnswerOption {
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id: AnswerId::new(id),
            content: content.into(),
            is_correct,
        }
    }
}

/// A question nested under a grouped item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    pub id: QuestionId,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answers: Vec<AnswerOption>,
}

impl SubQuestion {
    #[must_use]
    pub fn new(id: impl Into<String>, answers: Vec<AnswerOption>) -> Self {
        Self {
            id: QuestionId::new(id),
            question: None,
            answers,
        }
    }

    /// The option flagged correct, if any.
    #[must_use]
    pub fn correct_answer(&self) -> Option<&AnswerId> {
        correct_in(&self.answers)
    }
}

fn correct_in(answers: &[AnswerOption]) -> Option<&AnswerId> {
    answers.iter().find(|a| a.is_correct).map(|a| &a.id)
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A validated question item.
///
/// Media references are opaque URLs handed to the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answers: Vec<AnswerOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<SubQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    /// Builds a single-answer question.
    #[must_use]
    pub fn single(id: impl Into<String>, kind: QuestionKind, answers: Vec<AnswerOption>) -> Self {
        Self {
            id: QuestionId::new(id),
            kind,
            answers,
            questions: Vec::new(),
            audio: None,
            image: None,
            subtitle: None,
            explanation: None,
        }
    }

    /// Builds a grouped question from its sub-questions.
    #[must_use]
    pub fn grouped(id: impl Into<String>, kind: QuestionKind, questions: Vec<SubQuestion>) -> Self {
        Self {
            questions,
            ..Self::single(id, kind, Vec::new())
        }
    }

    #[must_use]
    pub fn with_audio(mut self, url: impl Into<String>) -> Self {
        self.audio = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    #[must_use]
    pub fn has_sub_questions(&self) -> bool {
        !self.questions.is_empty()
    }

    /// The flat-list option flagged correct, if any.
    #[must_use]
    pub fn correct_answer(&self) -> Option<&AnswerId> {
        correct_in(&self.answers)
    }

    #[must_use]
    pub fn sub_question(&self, id: &QuestionId) -> Option<&SubQuestion> {
        self.questions.iter().find(|q| &q.id == id)
    }

    /// Checks that the answer shape fits the kind.
    ///
    /// Single-answer kinds need a flat answer list and no sub-questions;
    /// grouped kinds need sub-questions, each with its own answers. Every
    /// scored list flags exactly one correct option.
    ///
    /// # Errors
    ///
    /// Returns `MissingAnswers`, `ExpectedAnswers`, `ExpectedSubQuestions`,
    /// `SubQuestionWithoutAnswers` or `CorrectAnswerCount`.
    pub fn check_shape(&self) -> Result<(), ConfigurationError> {
        if self.answers.is_empty() && self.questions.is_empty() {
            return Err(ConfigurationError::MissingAnswers {
                id: self.id.clone(),
            });
        }

        if !self.kind.is_grouped() {
            if self.answers.is_empty() || !self.questions.is_empty() {
                return Err(ConfigurationError::ExpectedAnswers {
                    id: self.id.clone(),
                    kind: self.kind,
                });
            }
            return exactly_one_correct(&self.id, &self.answers);
        }

        if self.questions.is_empty() {
            return Err(ConfigurationError::ExpectedSubQuestions {
                id: self.id.clone(),
                kind: self.kind,
            });
        }
        for sub in &self.questions {
            if sub.answers.is_empty() {
                return Err(ConfigurationError::SubQuestionWithoutAnswers {
                    id: self.id.clone(),
                    sub: sub.id.clone(),
                });
            }
            exactly_one_correct(&sub.id, &sub.answers)?;
        }
        Ok(())
    }
}

fn exactly_one_correct(id: &QuestionId, answers: &[AnswerOption]) -> Result<(), ConfigurationError> {
    match answers.iter().filter(|a| a.is_correct).count() {
        1 => Ok(()),
        found => Err(ConfigurationError::CorrectAnswerCount {
            id: id.clone(),
            found,
        }),
    }
}

/// A question as delivered by the content backend, before its type is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawQuestion {
    pub id: QuestionId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub answers: Option<Vec<AnswerOption>>,
    #[serde(default)]
    pub questions: Option<Vec<SubQuestion>>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl TryFrom<RawQuestion> for Question {
    type Error = ConfigurationError;

    fn try_from(raw: RawQuestion) -> Result<Self, Self::Error> {
        let kind = raw
            .kind
            .parse::<QuestionKind>()
            .map_err(|e| ConfigurationError::UnknownQuestionType {
                id: raw.id.clone(),
                kind: e.0,
            })?;

        let question = Question {
            id: raw.id,
            kind,
            answers: raw.answers.unwrap_or_default(),
            questions: raw.questions.unwrap_or_default(),
            audio: raw.audio,
            image: raw.image,
            subtitle: raw.subtitle,
            explanation: raw.explanation,
        };
        question.check_shape()?;
        Ok(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: &str) -> RawQuestion {
        RawQuestion {
            id: QuestionId::new("q1"),
            kind: kind.to_owned(),
            answers: Some(vec![
                AnswerOption::new("a", "A", true),
                AnswerOption::new("b", "B", false),
            ]),
            questions: None,
            audio: None,
            image: None,
            subtitle: None,
            explanation: None,
        }
    }

    #[test]
    fn kind_parses_common_spellings() {
        assert_eq!(
            "FILL_IN_BLANK".parse::<QuestionKind>().unwrap(),
            QuestionKind::FillInBlank
        );
        assert_eq!(
            "read-and-understand".parse::<QuestionKind>().unwrap(),
            QuestionKind::ReadAndUnderstand
        );
        assert!("ESSAY".parse::<QuestionKind>().is_err());
    }

    #[test]
    fn grouped_kinds_are_the_multi_response_ones() {
        let grouped: Vec<_> = QuestionKind::ALL
            .into_iter()
            .filter(|k| k.is_grouped())
            .collect();
        assert_eq!(grouped.len(), 4);
        assert!(!QuestionKind::AskAndAnswer.is_grouped());
    }

    #[test]
    fn raw_question_with_unknown_type_is_rejected() {
        let err = Question::try_from(raw("ESSAY")).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownQuestionType { .. }));
    }

    #[test]
    fn raw_question_without_answers_is_rejected() {
        let mut r = raw("ASK_AND_ANSWER");
        r.answers = None;
        r.questions = Some(Vec::new());
        let err = Question::try_from(r).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingAnswers { .. }));
    }

    #[test]
    fn grouped_kind_with_flat_answers_is_rejected() {
        let err = Question::try_from(raw("CONVERSATION_PIECE")).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::ExpectedSubQuestions {
                id: QuestionId::new("q1"),
                kind: QuestionKind::ConversationPiece,
            }
        );
    }

    #[test]
    fn single_kind_with_sub_questions_is_rejected() {
        let q = Question::grouped(
            "q1",
            QuestionKind::AskAndAnswer,
            vec![SubQuestion::new("s1", vec![AnswerOption::new("x", "X", true)])],
        );
        assert!(matches!(
            q.check_shape().unwrap_err(),
            ConfigurationError::ExpectedAnswers { .. }
        ));
    }

    #[test]
    fn sub_question_needs_answers() {
        let q = Question::grouped(
            "g1",
            QuestionKind::ReadAndUnderstand,
            vec![
                SubQuestion::new("s1", vec![AnswerOption::new("x", "X", true)]),
                SubQuestion::new("s2", Vec::new()),
            ],
        );
        assert_eq!(
            q.check_shape().unwrap_err(),
            ConfigurationError::SubQuestionWithoutAnswers {
                id: QuestionId::new("g1"),
                sub: QuestionId::new("s2"),
            }
        );
    }

    #[test]
    fn exactly_one_option_is_flagged_correct() {
        let mut two = raw("ASK_AND_ANSWER");
        two.answers = Some(vec![
            AnswerOption::new("a", "A", true),
            AnswerOption::new("b", "B", true),
        ]);
        assert_eq!(
            Question::try_from(two).unwrap_err(),
            ConfigurationError::CorrectAnswerCount {
                id: QuestionId::new("q1"),
                found: 2,
            }
        );

        let none = Question::grouped(
            "g1",
            QuestionKind::ShortTalk,
            vec![SubQuestion::new("s1", vec![AnswerOption::new("x", "X", false)])],
        );
        assert_eq!(
            none.check_shape().unwrap_err(),
            ConfigurationError::CorrectAnswerCount {
                id: QuestionId::new("s1"),
                found: 0,
            }
        );
    }

    #[test]
    fn correct_answer_is_found() {
        let q = Question::try_from(raw("IMAGE_DESCRIPTION")).unwrap();
        assert_eq!(q.correct_answer(), Some(&AnswerId::new("a")));
    }

    #[test]
    fn question_deserializes_from_backend_json() {
        let json = r#"{
            "id": "q9",
            "type": "SHORT_TALK",
            "audio": "https://cdn.example/talk.mp3",
            "questions": [
                {"id": "s1", "answers": [{"id": "x", "isCorrect": false}, {"id": "y", "is_correct": true}]}
            ]
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.kind, QuestionKind::ShortTalk);
        assert!(q.has_sub_questions());
        assert_eq!(q.questions[0].correct_answer(), Some(&AnswerId::new("y")));
    }
}
