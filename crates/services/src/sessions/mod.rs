mod listener;
mod progress;
mod runner;
mod service;
mod timer_driver;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use listener::{ChannelListener, NoopListener, SessionEvent, SessionListener};
pub use progress::{SessionProgress, SessionSnapshot, SessionState};
pub use runner::{SessionHandle, SessionRunner};
pub use service::{
    AnswerOutcome, AutoSubmit, ExamSession, Navigation, SessionBuilder, SubmitRequest,
};
pub use timer_driver::{TickSignal, TimerDriver};
