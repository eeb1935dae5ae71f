mod answer;
mod config;
mod ids;
mod question;
mod result;

pub use ids::{AnswerId, ParseIdError, QuestionId, SessionId};

pub use answer::{AnswerPayload, AnswerStore, UserAnswer};
pub use config::{
    DEFAULT_PASS_THRESHOLD, DEFAULT_WARNING_THRESHOLDS, SessionConfig, SessionMode,
};
pub use question::{AnswerOption, Question, QuestionKind, RawQuestion, SubQuestion, UnknownKind};
pub use result::{Difficulty, QuestionStat, SessionResult, SessionStats};
