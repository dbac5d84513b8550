use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EventResult<T> = Result<T, EventError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventErrorCategory {
    EventStopped,
    InputValidationError,
    IoSystemError,
    StageFailure,
    InvariantViolation,
    InternalError,
}

impl EventErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::EventStopped => 0,
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::StageFailure => 4,
            Self::InvariantViolation => 5,
            Self::InternalError => 6,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::EventStopped => "EventStopped",
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::StageFailure => "StageFailure",
            Self::InvariantViolation => "InvariantViolation",
            Self::InternalError => "InternalError",
        }
    }

    /// Level printed in front of a diagnostic line.
    pub const fn severity(self) -> &'static str {
        match self {
            Self::EventStopped => "INFO",
            Self::InputValidationError | Self::IoSystemError | Self::StageFailure => "ERROR",
            Self::InvariantViolation | Self::InternalError => "FATAL",
        }
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::EventStopped)
    }

    /// Errors that must end the whole run instead of only the current event.
    pub const fn aborts_run(self) -> bool {
        matches!(self, Self::InvariantViolation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventError {
    category: EventErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl EventError {
    pub fn new(
        category: EventErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn stop(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(EventErrorCategory::EventStopped, placeholder, message)
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            EventErrorCategory::InputValidationError,
            placeholder,
            message,
        )
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(EventErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn stage_failure(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(EventErrorCategory::StageFailure, placeholder, message)
    }

    pub fn invariant(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(EventErrorCategory::InvariantViolation, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(EventErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> EventErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn is_stop(&self) -> bool {
        matches!(self.category, EventErrorCategory::EventStopped)
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!(
            "{}: [{}] {}",
            self.category.severity(),
            self.placeholder,
            self.message
        )
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}

impl Display for EventError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.name(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for EventError {}
