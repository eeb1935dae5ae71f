#![forbid(unsafe_code)]

pub mod aggregate;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod time;
pub mod timer;
pub mod validation;

pub use error::ConfigurationError;
pub use time::Clock;
pub use timer::{CountdownTimer, TickOutcome, TimerState};
pub use validation::{QuestionSet, prepare, validate_questions};
