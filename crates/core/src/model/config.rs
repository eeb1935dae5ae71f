use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ConfigurationError;

//
// ─── MODE ──────────────────────────────────────────────────────────────────────
//

/// How a session is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMode {
    /// Self-paced, no timer, each question must be completed before moving on.
    Lesson,
    /// Timed, free navigation, scored pass/fail.
    FinalTest,
}

impl SessionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Lesson => "LESSON",
            SessionMode::FinalTest => "FINAL_TEST",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('-', "_").to_ascii_uppercase().as_str() {
            "LESSON" => Ok(SessionMode::Lesson),
            "FINAL_TEST" | "TEST" => Ok(SessionMode::FinalTest),
            other => Err(format!("unknown session mode: {other}")),
        }
    }
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Default remaining-time warnings for timed sessions, in seconds.
pub const DEFAULT_WARNING_THRESHOLDS: [u32; 2] = [60, 300];

/// Default pass threshold, as an accuracy percentage.
pub const DEFAULT_PASS_THRESHOLD: f64 = 50.0;

/// Session configuration.
///
/// Optional fields fall back to per-mode defaults when deserialized.
/// Call [`SessionConfig::validate`] before building a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSessionConfig")]
#[allow(clippy::struct_excessive_bools)]
pub struct SessionConfig {
    mode: SessionMode,
    time_limit_secs: Option<u32>,
    warning_thresholds: Vec<u32>,
    allow_jump_navigation: bool,
    enable_pause: bool,
    auto_submit_on_timeout: bool,
    require_submit_confirmation: bool,
    pass_threshold: f64,
}

impl SessionConfig {
    /// Lesson defaults: untimed, sequential, no pause.
    #[must_use]
    pub fn lesson() -> Self {
        Self {
            mode: SessionMode::Lesson,
            time_limit_secs: None,
            warning_thresholds: Vec::new(),
            allow_jump_navigation: false,
            enable_pause: false,
            auto_submit_on_timeout: false,
            require_submit_confirmation: false,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }

    /// Final test defaults: timed, jump navigation, pausable, auto-submit.
    #[must_use]
    pub fn final_test(time_limit_secs: u32) -> Self {
        Self {
            mode: SessionMode::FinalTest,
            time_limit_secs: Some(time_limit_secs),
            warning_thresholds: DEFAULT_WARNING_THRESHOLDS.to_vec(),
            allow_jump_navigation: true,
            enable_pause: true,
            auto_submit_on_timeout: true,
            require_submit_confirmation: true,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }

    #[must_use]
    pub fn for_mode(mode: SessionMode, time_limit_secs: Option<u32>) -> Self {
        match mode {
            SessionMode::Lesson => Self::lesson(),
            SessionMode::FinalTest => Self {
                time_limit_secs,
                ..Self::final_test(0)
            },
        }
    }

    #[must_use]
    pub fn with_time_limit(mut self, secs: u32) -> Self {
        self.time_limit_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn with_warning_thresholds(mut self, thresholds: impl Into<Vec<u32>>) -> Self {
        self.warning_thresholds = thresholds.into();
        self
    }

    #[must_use]
    pub fn with_jump_navigation(mut self, allow: bool) -> Self {
        self.allow_jump_navigation = allow;
        self
    }

    #[must_use]
    pub fn with_pause(mut self, enable: bool) -> Self {
        self.enable_pause = enable;
        self
    }

    #[must_use]
    pub fn with_auto_submit(mut self, enable: bool) -> Self {
        self.auto_submit_on_timeout = enable;
        self
    }

    #[must_use]
    pub fn with_submit_confirmation(mut self, require: bool) -> Self {
        self.require_submit_confirmation = require;
        self
    }

    #[must_use]
    pub fn with_pass_threshold(mut self, percent: f64) -> Self {
        self.pass_threshold = percent;
        self
    }

    /// Checks the configuration and normalizes warning thresholds to an
    /// ascending, de-duplicated list.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::MissingTimeLimit` for a final test without a
    /// positive limit, `InvalidWarningThreshold` for a zero threshold and
    /// `InvalidPassThreshold` for a threshold outside `0..=100`.
    pub fn validate(mut self) -> Result<Self, ConfigurationError> {
        if self.mode == SessionMode::FinalTest && self.time_limit_secs.unwrap_or(0) == 0 {
            return Err(ConfigurationError::MissingTimeLimit);
        }
        if self.warning_thresholds.contains(&0) {
            return Err(ConfigurationError::InvalidWarningThreshold);
        }
        if !(0.0..=100.0).contains(&self.pass_threshold) {
            return Err(ConfigurationError::InvalidPassThreshold(self.pass_threshold));
        }
        self.warning_thresholds.sort_unstable();
        self.warning_thresholds.dedup();
        Ok(self)
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.mode == SessionMode::FinalTest && self.time_limit_secs.unwrap_or(0) > 0
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> Option<u32> {
        self.time_limit_secs
    }

    #[must_use]
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs.map(|s| Duration::from_secs(u64::from(s)))
    }

    #[must_use]
    pub fn warning_thresholds(&self) -> &[u32] {
        &self.warning_thresholds
    }

    #[must_use]
    pub fn allow_jump_navigation(&self) -> bool {
        self.allow_jump_navigation
    }

    #[must_use]
    pub fn enable_pause(&self) -> bool {
        self.enable_pause
    }

    #[must_use]
    pub fn auto_submit_on_timeout(&self) -> bool {
        self.auto_submit_on_timeout
    }

    #[must_use]
    pub fn require_submit_confirmation(&self) -> bool {
        self.require_submit_confirmation
    }

    #[must_use]
    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::lesson()
    }
}

/// Wire shape of a config block; absent fields take the mode's defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSessionConfig {
    mode: SessionMode,
    #[serde(default, alias = "time_limit", alias = "time_limit_secs")]
    time_limit: Option<u32>,
    #[serde(default, alias = "warning_thresholds")]
    warning_thresholds: Option<Vec<u32>>,
    #[serde(default, alias = "allow_jump_navigation")]
    allow_jump_navigation: Option<bool>,
    #[serde(default, alias = "enable_pause")]
    enable_pause: Option<bool>,
    #[serde(default, alias = "auto_submit_on_timeout")]
    auto_submit_on_timeout: Option<bool>,
    #[serde(default, alias = "require_submit_confirmation")]
    require_submit_confirmation: Option<bool>,
    #[serde(default, alias = "pass_threshold", alias = "minScore")]
    pass_threshold: Option<f64>,
}

impl From<RawSessionConfig> for SessionConfig {
    fn from(raw: RawSessionConfig) -> Self {
        let base = SessionConfig::for_mode(raw.mode, raw.time_limit);
        Self {
            warning_thresholds: raw.warning_thresholds.unwrap_or(base.warning_thresholds),
            allow_jump_navigation: raw
                .allow_jump_navigation
                .unwrap_or(base.allow_jump_navigation),
            enable_pause: raw.enable_pause.unwrap_or(base.enable_pause),
            auto_submit_on_timeout: raw
                .auto_submit_on_timeout
                .unwrap_or(base.auto_submit_on_timeout),
            require_submit_confirmation: raw
                .require_submit_confirmation
                .unwrap_or(base.require_submit_confirmation),
            pass_threshold: raw.pass_threshold.unwrap_or(base.pass_threshold),
            ..base
        }
    }
}
