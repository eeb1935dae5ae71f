use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use exam_core::model::{AnswerId, AnswerPayload, Question, QuestionId, SessionResult};
use storage::repository::SessionResultRepository;

use super::progress::SessionSnapshot;
use super::service::{AnswerOutcome, AutoSubmit, ExamSession, Navigation, SubmitRequest};
use super::timer_driver::{TickSignal, TimerDriver};
use crate::error::SessionError;

type Reply<T> = oneshot::Sender<T>;

/// Work items processed one at a time by the runner.
enum Command {
    Answer(AnswerPayload, Reply<AnswerOutcome>),
    SelectSubAnswer(QuestionId, AnswerId, Reply<AnswerOutcome>),
    Next(Reply<Navigation>),
    Previous(Reply<Navigation>),
    GoTo(usize, Reply<Navigation>),
    Pause(Reply<bool>),
    Resume(Reply<bool>),
    RequestSubmit(Reply<Result<SubmitRequest, SessionError>>),
    Submit(Reply<Result<SessionResult, SessionError>>),
    PersistResult(Reply<Result<Option<i64>, SessionError>>),
    Exit(Reply<()>),
    Restart(Reply<bool>),
    Snapshot(Reply<SessionSnapshot>),
    ResultId(Reply<Option<i64>>),
    Tick(TickSignal),
    AutoSubmit(AutoSubmit),
    Shutdown,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Answer(..) => "Answer",
            Command::SelectSubAnswer(..) => "SelectSubAnswer",
            Command::Next(_) => "Next",
            Command::Previous(_) => "Previous",
            Command::GoTo(..) => "GoTo",
            Command::Pause(_) => "Pause",
            Command::Resume(_) => "Resume",
            Command::RequestSubmit(_) => "RequestSubmit",
            Command::Submit(_) => "Submit",
            Command::PersistResult(_) => "PersistResult",
            Command::Exit(_) => "Exit",
            Command::Restart(_) => "Restart",
            Command::Snapshot(_) => "Snapshot",
            Command::ResultId(_) => "ResultId",
            Command::Tick(_) => "Tick",
            Command::AutoSubmit(_) => "AutoSubmit",
            Command::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl From<TickSignal> for Command {
    fn from(signal: TickSignal) -> Self {
        Command::Tick(signal)
    }
}

/// Drives an [`ExamSession`] from a single task.
///
/// User commands, timer ticks and deferred auto-submissions all go through
/// one queue, so the session is never touched concurrently. Submitted
/// results are written to the result repository when one is configured.
pub struct SessionRunner {
    session: ExamSession,
    results: Option<Arc<dyn SessionResultRepository>>,
    tick_period: Duration,
}

impl SessionRunner {
    #[must_use]
    pub fn new(session: ExamSession) -> Self {
        Self {
            session,
            results: None,
            tick_period: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_results(mut self, results: Arc<dyn SessionResultRepository>) -> Self {
        self.results = Some(results);
        self
    }

    /// Real time between countdown ticks. Defaults to one second.
    #[must_use]
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Spawns the runner on the current tokio runtime.
    ///
    /// The task ends on [`SessionHandle::shutdown`] or when every handle is
    /// dropped, yielding the submitted result if there is one.
    #[must_use]
    pub fn spawn(self) -> (SessionHandle, JoinHandle<Option<SessionResult>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let questions: Arc<[Question]> = self.session.questions().into();
        let actor = RunnerTask {
            session: self.session,
            results: self.results,
            driver: TimerDriver::new(self.tick_period),
            rx,
            tx: tx.downgrade(),
            result_id: None,
        };
        let join = tokio::spawn(actor.run());
        (SessionHandle { tx, questions }, join)
    }
}

impl fmt::Debug for SessionRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRunner")
            .field("session", &self.session)
            .field("persists", &self.results.is_some())
            .field("tick_period", &self.tick_period)
            .finish()
    }
}

struct RunnerTask {
    session: ExamSession,
    results: Option<Arc<dyn SessionResultRepository>>,
    driver: TimerDriver,
    rx: UnboundedReceiver<Command>,
    tx: WeakUnboundedSender<Command>,
    result_id: Option<i64>,
}

impl RunnerTask {
    async fn run(mut self) -> Option<SessionResult> {
        self.sync_timer();
        while let Some(command) = self.rx.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle(command).await;
            self.sync_timer();
        }
        self.driver.stop();
        log::debug!("runner for session {} finished", self.session.id());
        self.session.result().cloned()
    }

    fn sync_timer(&mut self) {
        self.driver.sync(
            self.session.is_timer_running(),
            self.session.generation(),
            &self.tx,
        );
    }

    async fn handle(&mut self, command: Command) {
        // A dropped reply receiver means the caller stopped waiting.
        match command {
            Command::Answer(payload, reply) => {
                let _ = reply.send(self.session.save_answer(payload));
            }
            Command::SelectSubAnswer(sub, answer, reply) => {
                let _ = reply.send(self.session.select_sub_answer(sub, answer));
            }
            Command::Next(reply) => {
                let nav = self.session.go_next();
                if nav == Navigation::Submitted {
                    self.persist_logged().await;
                }
                let _ = reply.send(nav);
            }
            Command::Previous(reply) => {
                let _ = reply.send(self.session.go_previous());
            }
            Command::GoTo(index, reply) => {
                let _ = reply.send(self.session.go_to(index));
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.session.pause_session());
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.session.resume_session());
            }
            Command::RequestSubmit(reply) => {
                let outcome = match self.session.request_submit() {
                    Ok(SubmitRequest::Submitted(result)) => self
                        .persist()
                        .await
                        .map(|_| SubmitRequest::Submitted(result)),
                    other => other,
                };
                let _ = reply.send(outcome);
            }
            Command::Submit(reply) => {
                let outcome = match self.session.submit_session() {
                    Ok(result) => self.persist().await.map(|_| result),
                    Err(e) => Err(e),
                };
                let _ = reply.send(outcome);
            }
            Command::PersistResult(reply) => {
                let _ = reply.send(self.persist().await);
            }
            Command::Exit(reply) => {
                self.session.exit_session();
                self.result_id = None;
                let _ = reply.send(());
            }
            Command::Restart(reply) => {
                let _ = reply.send(self.session.start_session());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
            Command::ResultId(reply) => {
                let _ = reply.send(self.result_id);
            }
            Command::Tick(signal) => {
                if !self.driver.is_current(signal) {
                    log::debug!("dropping tick from retired ticker {}", signal.ticker);
                    return;
                }
                if let Some(pending) = self.session.tick(signal.generation) {
                    self.defer_auto_submit(pending).await;
                }
            }
            Command::AutoSubmit(pending) => {
                if self.session.auto_submit(pending).is_some() {
                    self.persist_logged().await;
                }
            }
            Command::Shutdown => {}
        }
    }

    /// Queues the auto-submission behind whatever is already waiting.
    async fn defer_auto_submit(&mut self, pending: AutoSubmit) {
        if let Some(tx) = self.tx.upgrade() {
            if tx.send(Command::AutoSubmit(pending)).is_ok() {
                return;
            }
        }
        // No handle is left to enqueue through; submit directly.
        if self.session.auto_submit(pending).is_some() {
            self.persist_logged().await;
        }
    }

    /// Writes the submitted result once. Returns the stored id, or `None`
    /// when nothing is submitted or no repository is configured.
    async fn persist(&mut self) -> Result<Option<i64>, SessionError> {
        if self.result_id.is_some() {
            return Ok(self.result_id);
        }
        let (Some(repo), Some(result)) = (self.results.as_ref(), self.session.result()) else {
            return Ok(None);
        };

        let id = repo.append_result(result).await?;
        log::info!("stored result {id} for session {}", result.session_id);
        self.result_id = Some(id);
        Ok(Some(id))
    }

    async fn persist_logged(&mut self) {
        if let Err(e) = self.persist().await {
            log::error!(
                "failed to store result for session {}: {e}",
                self.session.id()
            );
        }
    }
}

/// Cloneable front end to a running [`SessionRunner`].
///
/// Every call fails with `SessionError::RunnerClosed` once the runner has
/// stopped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<Command>,
    questions: Arc<[Question]>,
}

impl SessionHandle {
    /// The validated questions the session runs over, in display order.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| SessionError::RunnerClosed)?;
        rx.await.map_err(|_| SessionError::RunnerClosed)
    }

    /// Replaces the current question's answer.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner has stopped.
    pub async fn answer(&self, payload: AnswerPayload) -> Result<AnswerOutcome, SessionError> {
        self.call(|r| Command::Answer(payload, r)).await
    }

    /// Sets one sub-question's selection on the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner has stopped.
    pub async fn select_sub_answer(
        &self,
        sub_question: QuestionId,
        answer: AnswerId,
    ) -> Result<AnswerOutcome, SessionError> {
        self.call(|r| Command::SelectSubAnswer(sub_question, answer, r))
            .await
    }

    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner has stopped.
    pub async fn next(&self) -> Result<Navigation, SessionError> {
        self.call(Command::Next).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner has stopped.
    pub async fn previous(&self) -> Result<Navigation, SessionError> {
        self.call(Command::Previous).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner has stopped.
    pub async fn go_to(&self, index: usize) -> Result<Navigation, SessionError> {
        self.call(|r| Command::GoTo(index, r)).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner has stopped.
    pub async fn pause(&self) -> Result<bool, SessionError> {
        self.call(Command::Pause).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner has stopped.
    pub async fn resume(&self) -> Result<bool, SessionError> {
        self.call(Command::Resume).await
    }

    /// Submits unless confirmation is required for unanswered questions.
    ///
    /// # Errors
    ///
    /// Returns submission and storage errors, or `SessionError::RunnerClosed`.
    pub async fn request_submit(&self) -> Result<SubmitRequest, SessionError> {
        self.call(Command::RequestSubmit).await?
    }

    /// Submits and stores the result.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadySubmitted` or `NotActive` from the
    /// session, `Storage` if the result could not be written (the session
    /// stays submitted; retry with [`SessionHandle::persist_result`]), or
    /// `RunnerClosed`.
    pub async fn submit(&self) -> Result<SessionResult, SessionError> {
        self.call(Command::Submit).await?
    }

    /// Retries storing the submitted result.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on write failure, or `RunnerClosed`.
    pub async fn persist_result(&self) -> Result<Option<i64>, SessionError> {
        self.call(Command::PersistResult).await?
    }

    /// Storage id of the stored result, if it has been written.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner has stopped.
    pub async fn result_id(&self) -> Result<Option<i64>, SessionError> {
        self.call(Command::ResultId).await
    }

    /// Abandons the session. Pending timer work is discarded.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner has stopped.
    pub async fn exit(&self) -> Result<(), SessionError> {
        self.call(Command::Exit).await
    }

    /// Starts a fresh run after [`SessionHandle::exit`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner has stopped.
    pub async fn restart(&self) -> Result<bool, SessionError> {
        self.call(Command::Restart).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner has stopped.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.call(Command::Snapshot).await
    }

    /// Asks the runner to stop after the commands already queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}
