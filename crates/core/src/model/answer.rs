use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::model::ids::{AnswerId, QuestionId};

/// What the user selected for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerPayload {
    /// A single selected option (single-answer kinds).
    Single(AnswerId),
    /// Sub-question id to selected option (grouped kinds).
    Grouped(BTreeMap<QuestionId, AnswerId>),
}

impl AnswerPayload {
    #[must_use]
    pub fn single(id: impl Into<String>) -> Self {
        Self::Single(AnswerId::new(id))
    }

    /// Builds a grouped payload from `(sub_question, answer)` pairs.
    #[must_use]
    pub fn grouped<I, Q, A>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Q, A)>,
        Q: Into<String>,
        A: Into<String>,
    {
        Self::Grouped(
            pairs
                .into_iter()
                .map(|(q, a)| (QuestionId::new(q), AnswerId::new(a)))
                .collect(),
        )
    }

    /// Selection recorded for a sub-question, if this is a grouped payload.
    #[must_use]
    pub fn sub_answer(&self, sub_question: &QuestionId) -> Option<&AnswerId> {
        match self {
            AnswerPayload::Grouped(map) => map.get(sub_question),
            AnswerPayload::Single(_) => None,
        }
    }
}

/// A recorded answer.
///
/// `time_spent` is measured from session start, not from when the question
/// was shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAnswer {
    pub question_id: QuestionId,
    pub payload: AnswerPayload,
    pub answered_at: DateTime<Utc>,
    pub time_spent: Duration,
}

/// Latest answer per question.
///
/// Re-answering overwrites the previous entry; entries are only dropped when
/// the whole session is reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerStore {
    entries: BTreeMap<QuestionId, UserAnswer>,
}

impl AnswerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `answer`, returning the entry it replaced.
    pub fn record(&mut self, answer: UserAnswer) -> Option<UserAnswer> {
        self.entries.insert(answer.question_id.clone(), answer)
    }

    #[must_use]
    pub fn get(&self, id: &QuestionId) -> Option<&UserAnswer> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &QuestionId) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserAnswer> {
        self.entries.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn answer(q: &str, a: &str, secs: u64) -> UserAnswer {
        UserAnswer {
            question_id: QuestionId::new(q),
            payload: AnswerPayload::single(a),
            answered_at: fixed_now(),
            time_spent: Duration::from_secs(secs),
        }
    }

    #[test]
    fn record_overwrites_previous_entry() {
        let mut store = AnswerStore::new();
        assert!(store.record(answer("q1", "a", 3)).is_none());
        let previous = store.record(answer("q1", "b", 7)).unwrap();

        assert_eq!(previous.payload, AnswerPayload::single("a"));
        assert_eq!(store.len(), 1);
        let latest = store.get(&QuestionId::new("q1")).unwrap();
        assert_eq!(latest.payload, AnswerPayload::single("b"));
        assert_eq!(latest.time_spent, Duration::from_secs(7));
    }

    #[test]
    fn grouped_payload_looks_up_sub_answers() {
        let payload = AnswerPayload::grouped([("s1", "a"), ("s2", "c")]);
        assert_eq!(
            payload.sub_answer(&QuestionId::new("s2")),
            Some(&AnswerId::new("c"))
        );
        assert_eq!(payload.sub_answer(&QuestionId::new("s3")), None);
        assert_eq!(
            AnswerPayload::single("a").sub_answer(&QuestionId::new("s1")),
            None
        );
    }

    #[test]
    fn payload_json_is_a_string_or_a_map() {
        let single: AnswerPayload = serde_json::from_str("\"a1\"").unwrap();
        assert_eq!(single, AnswerPayload::single("a1"));

        let grouped: AnswerPayload = serde_json::from_str(r#"{"s1": "a", "s2": "b"}"#).unwrap();
        assert_eq!(grouped, AnswerPayload::grouped([("s1", "a"), ("s2", "b")]));
    }
}
