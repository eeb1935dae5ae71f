use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use exam_core::TimerState;
use exam_core::model::{AnswerStore, SessionId};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    NotStarted,
    InProgress,
    Paused,
    Completed,
    Submitted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::NotStarted => "NOT_STARTED",
            SessionState::InProgress => "IN_PROGRESS",
            SessionState::Paused => "PAUSED",
            SessionState::Completed => "COMPLETED",
            SessionState::Submitted => "SUBMITTED",
        };
        f.write_str(s)
    }
}

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    /// Answered share in `0.0..=100.0`.
    pub percentage: f64,
}

impl SessionProgress {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(total: usize, answered: usize) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            answered as f64 / total as f64 * 100.0
        };
        Self {
            total,
            answered,
            remaining: total.saturating_sub(answered),
            percentage,
        }
    }
}

/// Read-only copy of everything a session tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: SessionState,
    pub current_index: usize,
    pub answers: AnswerStore,
    pub started_at: DateTime<Utc>,
    pub paused_duration: Duration,
    pub timer: Option<TimerState>,
    pub progress: SessionProgress,
}
