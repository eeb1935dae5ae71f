use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use exam_core::aggregate::{self, ResultInput};
use exam_core::evaluator;
use exam_core::model::{
    AnswerId, AnswerPayload, AnswerStore, Question, QuestionId, RawQuestion, SessionConfig,
    SessionId, SessionMode, SessionResult, UserAnswer,
};
use exam_core::time::elapsed_between;
use exam_core::{Clock, CountdownTimer, TimerState, validation};

use super::listener::{NoopListener, SessionListener};
use super::progress::{SessionProgress, SessionSnapshot, SessionState};
use crate::error::SessionError;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Result of recording an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Nothing was stored (session not in progress, or bad sub-question).
    Rejected,
    Recorded,
    /// Lesson mode with a complete answer: instant feedback.
    Checked { correct: bool },
}

/// Result of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved(usize),
    Blocked,
    /// Lesson mode: advancing past the last question submitted the session.
    Submitted,
}

/// Result of a submit request that honours confirmation settings.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitRequest {
    Submitted(Box<SessionResult>),
    ConfirmationRequired { unanswered: usize },
}

/// Deferred auto-submission produced by the tick that hit zero.
///
/// Deliver it on a later scheduling turn through
/// [`ExamSession::auto_submit`]; it is discarded if the session was exited
/// or restarted in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSubmit {
    generation: u64,
}

//
// ─── BUILDER ───────────────────────────────────────────────────────────────────
//

/// Validates input and starts an [`ExamSession`].
pub struct SessionBuilder {
    questions: Vec<Question>,
    config: SessionConfig,
    clock: Clock,
    listener: Box<dyn SessionListener>,
}

impl SessionBuilder {
    #[must_use]
    pub fn new(questions: Vec<Question>, config: SessionConfig) -> Self {
        Self {
            questions,
            config,
            clock: Clock::default(),
            listener: Box::new(NoopListener),
        }
    }

    /// Builder over backend questions whose types are not yet checked.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Configuration` for an unknown type or a
    /// malformed question.
    pub fn from_raw(raw: Vec<RawQuestion>, config: SessionConfig) -> Result<Self, SessionError> {
        let questions = raw
            .into_iter()
            .map(Question::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(questions, config))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_listener(mut self, listener: impl SessionListener + 'static) -> Self {
        self.listener = Box::new(listener);
        self
    }

    /// Validates and starts the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Configuration` if the question list or the
    /// configuration is invalid. No session state is created in that case.
    pub fn start(self) -> Result<ExamSession, SessionError> {
        validation::validate_questions(&self.questions)?;
        let config = self.config.validate()?;

        let timer = config
            .time_limit_secs()
            .filter(|_| config.is_timed())
            .map(|limit| CountdownTimer::new(limit, config.warning_thresholds()));

        let now = self.clock.now();
        let mut session = ExamSession {
            id: SessionId::generate(),
            config,
            questions: self.questions,
            state: SessionState::NotStarted,
            current: 0,
            answers: AnswerStore::new(),
            started_at: now,
            paused_at: None,
            paused_total: Duration::ZERO,
            timer,
            result: None,
            generation: 0,
            clock: self.clock,
            listener: self.listener,
        };
        session.start_session();
        Ok(session)
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// State machine for one pass through a question set.
///
/// The session owns its answers and countdown. Illegal requests (pausing a
/// lesson, answering while paused, moving past a gate) are logged no-ops;
/// only submission reports errors.
pub struct ExamSession {
    id: SessionId,
    config: SessionConfig,
    questions: Vec<Question>,
    state: SessionState,
    current: usize,
    answers: AnswerStore,
    started_at: DateTime<Utc>,
    paused_at: Option<DateTime<Utc>>,
    paused_total: Duration,
    timer: Option<CountdownTimer>,
    result: Option<SessionResult>,
    generation: u64,
    clock: Clock,
    listener: Box<dyn SessionListener>,
}

impl ExamSession {
    /// Starts a session with the system clock and no listener.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Configuration` for invalid input.
    pub fn new(questions: Vec<Question>, config: SessionConfig) -> Result<Self, SessionError> {
        SessionBuilder::new(questions, config).start()
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.config.mode()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    #[must_use]
    pub fn answer_for(&self, id: &QuestionId) -> Option<&UserAnswer> {
        self.answers.get(id)
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn timer(&self) -> Option<&TimerState> {
        self.timer.as_ref().map(CountdownTimer::state)
    }

    /// The submitted result, once there is one.
    #[must_use]
    pub fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    /// Bumped on every start and exit; stale timer work carries an older value.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.state == SessionState::InProgress
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.state == SessionState::Submitted
    }

    /// True while the countdown should receive ticks.
    #[must_use]
    pub fn is_timer_running(&self) -> bool {
        self.is_in_progress() && self.timer.as_ref().is_some_and(CountdownTimer::is_running)
    }

    /// Mutable access to the clock, for pinning and advancing time in tests.
    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    #[must_use]
    pub fn paused_duration(&self) -> Duration {
        let open = self
            .paused_at
            .map_or(Duration::ZERO, |at| elapsed_between(at, self.clock.now()));
        self.paused_total + open
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress::new(self.questions.len(), self.answers.len())
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            state: self.state,
            current_index: self.current,
            answers: self.answers.clone(),
            started_at: self.started_at,
            paused_duration: self.paused_duration(),
            timer: self.timer().cloned(),
            progress: self.progress(),
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// `NOT_STARTED -> IN_PROGRESS`. Runs on construction and after an exit.
    pub fn start_session(&mut self) -> bool {
        if self.state != SessionState::NotStarted {
            log::warn!("start ignored: session {} is {}", self.id, self.state);
            return false;
        }

        if self.generation > 0 {
            self.id = SessionId::generate();
        }
        self.generation += 1;
        self.started_at = self.clock.now();
        self.state = SessionState::InProgress;
        if let Some(timer) = self.timer.as_mut() {
            timer.start();
        }
        log::info!(
            "session {} started: {} mode, {} questions",
            self.id,
            self.config.mode(),
            self.questions.len()
        );
        self.notify_question_change();
        true
    }

    /// Pauses a timed session when the configuration allows it.
    pub fn pause_session(&mut self) -> bool {
        if self.config.mode() != SessionMode::FinalTest || !self.config.enable_pause() {
            log::warn!("pause ignored: pausing is not enabled for this session");
            return false;
        }
        if self.state != SessionState::InProgress {
            log::warn!("pause ignored: session is {}", self.state);
            return false;
        }

        if let Some(timer) = self.timer.as_mut() {
            timer.pause();
        }
        self.paused_at = Some(self.clock.now());
        self.state = SessionState::Paused;
        self.listener.on_pause();
        true
    }

    pub fn resume_session(&mut self) -> bool {
        if self.state != SessionState::Paused {
            log::warn!("resume ignored: session is {}", self.state);
            return false;
        }

        self.close_pause();
        if let Some(timer) = self.timer.as_mut() {
            timer.resume();
        }
        self.state = SessionState::InProgress;
        self.listener.on_resume();
        true
    }

    /// Abandons the session and resets it to its not-started defaults.
    pub fn exit_session(&mut self) {
        log::info!("session {} exited in state {}", self.id, self.state);
        self.state = SessionState::NotStarted;
        self.current = 0;
        self.answers.clear();
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
        if let Some(timer) = self.timer.as_mut() {
            timer.reset();
        }
        self.result = None;
        self.generation += 1;
        self.listener.on_exit();
    }

    fn close_pause(&mut self) {
        if let Some(at) = self.paused_at.take() {
            self.paused_total += elapsed_between(at, self.clock.now());
        }
    }

    // ─── Answers ────────────────────────────────────────────────────────────

    /// Replaces the current question's answer.
    pub fn save_answer(&mut self, payload: AnswerPayload) -> AnswerOutcome {
        if self.state != SessionState::InProgress {
            log::warn!("answer ignored: session is {}", self.state);
            return AnswerOutcome::Rejected;
        }
        let Some(question) = self.questions.get(self.current) else {
            return AnswerOutcome::Rejected;
        };

        let now = self.clock.now();
        let answer = UserAnswer {
            question_id: question.id.clone(),
            payload,
            answered_at: now,
            time_spent: elapsed_between(self.started_at, now),
        };
        self.listener.on_answer(&question.id, &answer);
        self.answers.record(answer);

        if self.config.mode() == SessionMode::Lesson {
            let payload = self.answers.get(&question.id).map(|a| &a.payload);
            if evaluator::is_complete(question, payload) {
                return AnswerOutcome::Checked {
                    correct: evaluator::evaluate(question, payload),
                };
            }
        }
        AnswerOutcome::Recorded
    }

    /// Sets one sub-question's selection, keeping the others.
    pub fn select_sub_answer(&mut self, sub_question: QuestionId, answer: AnswerId) -> AnswerOutcome {
        let Some(question) = self.current_question() else {
            return AnswerOutcome::Rejected;
        };
        if question.sub_question(&sub_question).is_none() {
            log::warn!(
                "answer ignored: {} is not a sub-question of {}",
                sub_question,
                question.id
            );
            return AnswerOutcome::Rejected;
        }

        let mut selections = match self.answers.get(&question.id).map(|a| &a.payload) {
            Some(AnswerPayload::Grouped(map)) => map.clone(),
            _ => Default::default(),
        };
        selections.insert(sub_question, answer);
        self.save_answer(AnswerPayload::Grouped(selections))
    }

    fn is_current_complete(&self) -> bool {
        self.current_question().is_some_and(|q| {
            evaluator::is_complete(q, self.answers.get(&q.id).map(|a| &a.payload))
        })
    }

    // ─── Navigation ─────────────────────────────────────────────────────────

    fn is_last(&self) -> bool {
        self.current + 1 >= self.questions.len()
    }

    #[must_use]
    pub fn can_go_next(&self) -> bool {
        if self.state != SessionState::InProgress || self.is_last() {
            return false;
        }
        match self.config.mode() {
            SessionMode::Lesson => self.is_current_complete(),
            SessionMode::FinalTest => true,
        }
    }

    #[must_use]
    pub fn can_go_previous(&self) -> bool {
        self.state == SessionState::InProgress && self.current > 0
    }

    /// Whether `go_to(index)` would move the cursor.
    #[must_use]
    pub fn can_go_to(&self, index: usize) -> bool {
        if self.state != SessionState::InProgress
            || index >= self.questions.len()
            || index == self.current
        {
            return false;
        }
        match self.config.mode() {
            SessionMode::Lesson => {
                index < self.current || self.answers.contains(&self.questions[index].id)
            }
            SessionMode::FinalTest => self.config.allow_jump_navigation(),
        }
    }

    /// Moves forward one question. In lesson mode, on a completed last
    /// question this submits the session instead.
    pub fn go_next(&mut self) -> Navigation {
        if self.state == SessionState::InProgress
            && self.config.mode() == SessionMode::Lesson
            && self.is_last()
        {
            if !self.is_current_complete() {
                log::warn!("next ignored: last question is not fully answered");
                return Navigation::Blocked;
            }
            return match self.submit_session() {
                Ok(_) => Navigation::Submitted,
                Err(e) => {
                    log::warn!("lesson submission failed: {e}");
                    Navigation::Blocked
                }
            };
        }

        if !self.can_go_next() {
            log::warn!("next ignored at question {}", self.current);
            return Navigation::Blocked;
        }
        self.move_to(self.current + 1)
    }

    pub fn go_previous(&mut self) -> Navigation {
        if !self.can_go_previous() {
            log::warn!("previous ignored at question {}", self.current);
            return Navigation::Blocked;
        }
        self.move_to(self.current - 1)
    }

    pub fn go_to(&mut self, index: usize) -> Navigation {
        if !self.can_go_to(index) {
            log::warn!("jump to {index} ignored at question {}", self.current);
            return Navigation::Blocked;
        }
        self.move_to(index)
    }

    fn move_to(&mut self, index: usize) -> Navigation {
        self.current = index;
        self.notify_question_change();
        Navigation::Moved(index)
    }

    fn notify_question_change(&mut self) {
        if let Some(question) = self.questions.get(self.current) {
            self.listener.on_question_change(self.current, question);
        }
    }

    // ─── Submission ─────────────────────────────────────────────────────────

    /// Submits unless confirmation is required and questions are unanswered.
    ///
    /// # Errors
    ///
    /// Same as [`ExamSession::submit_session`].
    pub fn request_submit(&mut self) -> Result<SubmitRequest, SessionError> {
        self.ensure_submittable()?;
        let unanswered = self
            .questions
            .iter()
            .filter(|q| {
                let payload = self.answers.get(&q.id).map(|a| &a.payload);
                !evaluator::is_complete(q, payload)
            })
            .count();
        if self.config.require_submit_confirmation() && unanswered > 0 {
            return Ok(SubmitRequest::ConfirmationRequired { unanswered });
        }
        self.submit_session()
            .map(|result| SubmitRequest::Submitted(Box::new(result)))
    }

    /// Scores the session and closes it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadySubmitted` on a second call and
    /// `SessionError::NotActive` when the session was exited.
    pub fn submit_session(&mut self) -> Result<SessionResult, SessionError> {
        self.ensure_submittable()?;

        self.close_pause();
        if let Some(timer) = self.timer.as_mut() {
            timer.stop();
        }
        self.state = SessionState::Completed;

        let result = aggregate::aggregate(ResultInput {
            session_id: self.id,
            config: &self.config,
            questions: &self.questions,
            answers: &self.answers,
            started_at: self.started_at,
            submitted_at: self.clock.now(),
            paused: self.paused_total,
        });

        self.state = SessionState::Submitted;
        log::info!(
            "session {} submitted: {}/{} correct ({:.1}%)",
            self.id,
            result.correct_answers,
            result.total_questions,
            result.accuracy
        );
        self.listener.on_complete(&result);
        self.result = Some(result.clone());
        Ok(result)
    }

    fn ensure_submittable(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::InProgress | SessionState::Paused => Ok(()),
            SessionState::Completed | SessionState::Submitted => {
                Err(SessionError::AlreadySubmitted)
            }
            SessionState::NotStarted => Err(SessionError::NotActive),
        }
    }

    // ─── Timer ──────────────────────────────────────────────────────────────

    /// Applies one countdown tick from the timer of `generation`.
    ///
    /// Fires due warnings. When the countdown hits zero with auto-submit
    /// enabled, returns the submission to run on the next turn; it is never
    /// run from inside the tick.
    pub fn tick(&mut self, generation: u64) -> Option<AutoSubmit> {
        if generation != self.generation {
            log::debug!("stale tick from generation {generation} ignored");
            return None;
        }
        if self.state != SessionState::InProgress {
            return None;
        }
        let outcome = self.timer.as_mut()?.tick();

        for remaining in outcome.warnings {
            self.listener.on_time_warning(remaining);
        }

        if !outcome.expired {
            return None;
        }
        if self.config.auto_submit_on_timeout() {
            log::info!("session {} ran out of time; auto-submitting", self.id);
            Some(AutoSubmit {
                generation: self.generation,
            })
        } else {
            log::info!("session {} ran out of time", self.id);
            None
        }
    }

    /// Runs a deferred auto-submission. Failures are logged, not returned.
    pub fn auto_submit(&mut self, pending: AutoSubmit) -> Option<SessionResult> {
        if pending.generation != self.generation {
            log::debug!(
                "discarding auto-submit from generation {}",
                pending.generation
            );
            return None;
        }
        match self.submit_session() {
            Ok(result) => Some(result),
            Err(e) => {
                log::warn!("auto-submit of session {} failed: {e}", self.id);
                None
            }
        }
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("id", &self.id)
            .field("mode", &self.config.mode())
            .field("state", &self.state)
            .field("questions_len", &self.questions.len())
            .field("current", &self.current)
            .field("answers_len", &self.answers.len())
            .field("started_at", &self.started_at)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
