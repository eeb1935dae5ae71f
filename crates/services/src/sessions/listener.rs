use tokio::sync::mpsc::UnboundedSender;

use exam_core::model::{Question, QuestionId, SessionResult, UserAnswer};

/// Outbound notifications from a session.
///
/// Every method defaults to a no-op so implementors pick what they need.
/// Calls are fire-and-forget: the session never waits on or reads from them.
pub trait SessionListener: Send {
    fn on_question_change(&mut self, _index: usize, _question: &Question) {}
    fn on_answer(&mut self, _question_id: &QuestionId, _answer: &UserAnswer) {}
    fn on_time_warning(&mut self, _remaining_secs: u32) {}
    fn on_pause(&mut self) {}
    fn on_resume(&mut self) {}
    fn on_complete(&mut self, _result: &SessionResult) {}
    fn on_exit(&mut self) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl SessionListener for NoopListener {}

/// Owned form of a listener callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    QuestionChanged { index: usize, question_id: QuestionId },
    Answered { question_id: QuestionId },
    TimeWarning { remaining_secs: u32 },
    Paused,
    Resumed,
    Completed(Box<SessionResult>),
    Exited,
}

/// Forwards every callback as a [`SessionEvent`] on a channel.
///
/// A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: UnboundedSender<SessionEvent>,
}

impl ChannelListener {
    #[must_use]
    pub fn new(tx: UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl SessionListener for ChannelListener {
    fn on_question_change(&mut self, index: usize, question: &Question) {
        self.emit(SessionEvent::QuestionChanged {
            index,
            question_id: question.id.clone(),
        });
    }

    fn on_answer(&mut self, question_id: &QuestionId, _answer: &UserAnswer) {
        self.emit(SessionEvent::Answered {
            question_id: question_id.clone(),
        });
    }

    fn on_time_warning(&mut self, remaining_secs: u32) {
        self.emit(SessionEvent::TimeWarning { remaining_secs });
    }

    fn on_pause(&mut self) {
        self.emit(SessionEvent::Paused);
    }

    fn on_resume(&mut self) {
        self.emit(SessionEvent::Resumed);
    }

    fn on_complete(&mut self, result: &SessionResult) {
        self.emit(SessionEvent::Completed(Box::new(result.clone())));
    }

    fn on_exit(&mut self) {
        self.emit(SessionEvent::Exited);
    }
}
