use std::sync::Arc;

use tokio::task::JoinHandle;

use exam_core::model::{RawQuestion, SessionConfig, SessionMode, SessionResult};
use storage::repository::{SessionResultRepository, SessionResultRow, Storage};

use crate::Clock;
use crate::error::{AppServicesError, SessionError};
use crate::sessions::{SessionBuilder, SessionHandle, SessionListener, SessionRunner};

/// Assembles result storage and launches session runners against it.
#[derive(Clone)]
pub struct ExamServices {
    clock: Clock,
    results: Arc<dyn SessionResultRepository>,
}

impl ExamServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(storage, clock))
    }

    /// Build services that keep results in memory only.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock) -> Self {
        Self {
            clock,
            results: storage.results,
        }
    }

    #[must_use]
    pub fn results(&self) -> Arc<dyn SessionResultRepository> {
        Arc::clone(&self.results)
    }

    /// Validates the question set, starts a session and spawns its runner.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Configuration` if the questions or the
    /// configuration are invalid; nothing is spawned in that case.
    pub fn launch(
        &self,
        questions: Vec<RawQuestion>,
        config: SessionConfig,
        listener: impl SessionListener + 'static,
    ) -> Result<(SessionHandle, JoinHandle<Option<SessionResult>>), SessionError> {
        let session = SessionBuilder::from_raw(questions, config)?
            .with_clock(self.clock)
            .with_listener(listener)
            .start()?;
        log::debug!("launching runner for {session:?}");
        Ok(SessionRunner::new(session)
            .with_results(self.results())
            .spawn())
    }

    /// Most recent stored results, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on backend failures.
    pub async fn recent_results(
        &self,
        mode: Option<SessionMode>,
        limit: u32,
    ) -> Result<Vec<SessionResultRow>, SessionError> {
        Ok(self.results.list_results(mode, limit).await?)
    }
}
