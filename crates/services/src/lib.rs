#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod sessions;

pub use exam_core::Clock;
pub use sessions as session;

pub use app_services::ExamServices;
pub use error::{AppServicesError, SessionError};

pub use sessions::{
    AnswerOutcome, ChannelListener, ExamSession, Navigation, NoopListener, SessionBuilder,
    SessionEvent, SessionHandle, SessionListener, SessionRunner, SessionSnapshot, SessionState,
    SubmitRequest,
};
