use async_trait::async_trait;
use exam_core::model::{SessionId, SessionMode, SessionResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A persisted result together with its storage id.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResultRow {
    pub id: i64,
    pub result: SessionResult,
}

impl SessionResultRow {
    #[must_use]
    pub fn new(id: i64, result: SessionResult) -> Self {
        Self { id, result }
    }
}

/// Repository contract for submitted session results.
///
/// Results are append-only: a session id is stored at most once.
#[async_trait]
pub trait SessionResultRepository: Send + Sync {
    /// Persist a result and return its storage id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a result for the same session is
    /// already stored, or other storage errors.
    async fn append_result(&self, result: &SessionResult) -> Result<i64, StorageError>;

    /// Fetch a result by storage id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_result(&self, id: i64) -> Result<SessionResult, StorageError>;

    /// Look up the stored result of a session run.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_by_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<SessionResultRow>, StorageError>;

    /// Most recent results first, optionally filtered by mode.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_results(
        &self,
        mode: Option<SessionMode>,
        limit: u32,
    ) -> Result<Vec<SessionResultRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    results: Arc<Mutex<BTreeMap<i64, SessionResult>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

#[async_trait]
impl SessionResultRepository for InMemoryRepository {
    async fn append_result(&self, result: &SessionResult) -> Result<i64, StorageError> {
        let mut guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.values().any(|r| r.session_id == result.session_id) {
            return Err(StorageError::Conflict);
        }
        let id = guard.keys().next_back().map_or(1, |last| last + 1);
        guard.insert(id, result.clone());
        Ok(id)
    }

    async fn get_result(&self, id: i64) -> Result<SessionResult, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn find_by_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<SessionResultRow>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .iter()
            .find(|(_, r)| r.session_id == session_id)
            .map(|(id, r)| SessionResultRow::new(*id, r.clone())))
    }

    async fn list_results(
        &self,
        mode: Option<SessionMode>,
        limit: u32,
    ) -> Result<Vec<SessionResultRow>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut rows: Vec<_> = guard
            .iter()
            .filter(|(_, r)| mode.is_none_or(|m| r.mode == m))
            .map(|(id, r)| SessionResultRow::new(*id, r.clone()))
            .collect();
        rows.sort_by(|a, b| {
            b.result
                .submitted_at
                .cmp(&a.result.submitted_at)
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

/// Result repository behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub results: Arc<dyn SessionResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let results: Arc<dyn SessionResultRepository> = Arc::new(InMemoryRepository::new());
        Self { results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use exam_core::model::SessionStats;
    use exam_core::time::fixed_now;

    fn build_result(mode: SessionMode, minutes: i64) -> SessionResult {
        let started_at = fixed_now();
        SessionResult {
            session_id: SessionId::generate(),
            mode,
            started_at,
            submitted_at: started_at + Duration::minutes(minutes),
            total_questions: 4,
            answered_questions: 3,
            correct_answers: 2,
            accuracy: 50.0,
            passed: (mode == SessionMode::FinalTest).then_some(true),
            total_time_spent: std::time::Duration::from_secs(60),
            question_stats: Vec::new(),
            type_accuracy: BTreeMap::new(),
            stats: SessionStats {
                average_time: std::time::Duration::from_secs(20),
                fastest_time: std::time::Duration::from_secs(10),
                slowest_time: std::time::Duration::from_secs(30),
                completion_rate: 0.75,
            },
        }
    }

    #[tokio::test]
    async fn appends_and_fetches_results() {
        let repo = InMemoryRepository::new();
        let result = build_result(SessionMode::FinalTest, 5);

        let id = repo.append_result(&result).await.unwrap();
        assert_eq!(id, 1);
        assert_eq!(repo.get_result(id).await.unwrap(), result);

        let row = repo.find_by_session(result.session_id).await.unwrap().unwrap();
        assert_eq!(row.id, id);
        assert!(matches!(
            repo.get_result(99).await.unwrap_err(),
            StorageError::NotFound
        ));
    }

    #[tokio::test]
    async fn rejects_duplicate_session() {
        let repo = InMemoryRepository::new();
        let result = build_result(SessionMode::Lesson, 1);
        repo.append_result(&result).await.unwrap();

        let err = repo.append_result(&result).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn lists_newest_first_with_mode_filter() {
        let repo = InMemoryRepository::new();
        let first = repo
            .append_result(&build_result(SessionMode::Lesson, 1))
            .await
            .unwrap();
        let second = repo
            .append_result(&build_result(SessionMode::FinalTest, 9))
            .await
            .unwrap();
        let third = repo
            .append_result(&build_result(SessionMode::FinalTest, 3))
            .await
            .unwrap();

        let all: Vec<_> = repo
            .list_results(None, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(all, vec![second, third, first]);

        let tests = repo
            .list_results(Some(SessionMode::FinalTest), 1)
            .await
            .unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].id, second);
    }
}
