use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::model::config::SessionMode;
use crate::model::ids::{QuestionId, SessionId};
use crate::model::question::QuestionKind;

/// Difficulty tag on a question statistic. Items carry no rating yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Unrated,
}

/// Outcome of a single question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionStat {
    pub question_id: QuestionId,
    pub kind: QuestionKind,
    pub answered: bool,
    pub correct: bool,
    pub time_spent: Duration,
    pub difficulty: Difficulty,
}

/// Timing and completion figures across the whole session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub average_time: Duration,
    pub fastest_time: Duration,
    pub slowest_time: Duration,
    /// Answered / total, in `0.0..=1.0`.
    pub completion_rate: f64,
}

/// Scored outcome of a submitted session. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: SessionId,
    pub mode: SessionMode,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub total_questions: usize,
    pub answered_questions: usize,
    pub correct_answers: usize,
    /// Percentage in `0.0..=100.0`.
    pub accuracy: f64,
    /// `None` outside final test mode.
    pub passed: Option<bool>,
    pub total_time_spent: Duration,
    pub question_stats: Vec<QuestionStat>,
    /// Accuracy percentage per kind; kinds absent from the set report 0.
    pub type_accuracy: BTreeMap<QuestionKind, f64>,
    pub stats: SessionStats,
}

impl SessionResult {
    #[must_use]
    pub fn incorrect_answers(&self) -> usize {
        self.total_questions - self.correct_answers
    }

    #[must_use]
    pub fn unanswered(&self) -> usize {
        self.total_questions - self.answered_questions
    }

    #[must_use]
    pub fn accuracy_for(&self, kind: QuestionKind) -> f64 {
        self.type_accuracy.get(&kind).copied().unwrap_or(0.0)
    }
}
