//! Error taxonomy and daemon exit codes.
//!
//! The variants mirror the informal taxonomy used throughout the original
//! `thermod` daemon (`ValidationError`, `SensorError`, `ActuatorError`,
//! `PersistenceError`, `TransactionError`, `CancelledError`): each recovery
//! path and each HTTP status mapping switches on these, not on raw strings.

use std::fmt;

/// The error taxonomy shared by the timetable engine, the control loop and
/// the control surface.
#[derive(Debug, thiserror::Error)]
pub enum ThermodError {
    /// Input does not match the JSON schema or a value is out of range.
    #[error("{0}")]
    Validation(String),

    /// The thermometer failed to produce a reading.
    #[error("{0}")]
    Sensor(String),

    /// The actuator failed to switch or report its status.
    #[error("{0}")]
    Actuator(String),

    /// An in-memory mutation succeeded but could not be persisted to disk.
    #[error("settings applied but not saved: {source}")]
    Persistence {
        #[source]
        source: std::io::Error,
    },

    /// An unexpected failure occurred partway through a multi-step mutation;
    /// the caller has already rolled the in-memory state back.
    #[error("{0}")]
    Transaction(String),

    /// Raised only during shutdown to unblock parked long-poll waiters.
    #[error("operation cancelled")]
    Cancelled,
}

impl ThermodError {
    /// Short, user-facing label (the `error` field of a control-surface
    /// error body).
    #[must_use]
    pub fn short(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid request",
            Self::Sensor(_) => "sensor error",
            Self::Actuator(_) => "actuator error",
            Self::Persistence { .. } => "settings not saved",
            Self::Transaction(_) => "internal error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Full explanation (the `explain` field of a control-surface error
    /// body).
    #[must_use]
    pub fn explain(&self) -> String {
        self.to_string()
    }
}

/// Reserved exit codes for the daemon binary, matching the taxonomy in
/// spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok,
    ConfigMissing,
    ConfigSyntax,
    ConfigInvalid,
    TimetableMissing,
    TimetableInvalid,
    SensorInit,
    ActuatorInit,
    SocketInit,
    RuntimeSensor,
    RuntimeActuator,
    ShutdownActuator,
    KeyboardInterrupt,
}

impl ExitCode {
    /// The process exit status this variant maps to.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::ConfigMissing => 10,
            Self::ConfigSyntax => 11,
            Self::ConfigInvalid => 12,
            Self::TimetableMissing => 20,
            Self::TimetableInvalid => 22,
            Self::SensorInit => 25,
            Self::ActuatorInit => 26,
            Self::SocketInit => 30,
            Self::RuntimeSensor => 52,
            Self::RuntimeActuator => 53,
            Self::ShutdownActuator => 60,
            Self::KeyboardInterrupt => 130,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (exit code {})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_interrupt_is_130() {
        assert_eq!(ExitCode::KeyboardInterrupt.code(), 130);
    }

    #[test]
    fn validation_error_short_label() {
        let err = ThermodError::Validation("bad mode".to_string());
        assert_eq!(err.short(), "invalid request");
        assert_eq!(err.explain(), "bad mode");
    }

    #[test]
    fn persistence_error_wraps_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ThermodError::Persistence { source: io_err };
        assert_eq!(err.short(), "settings not saved");
        assert!(err.explain().contains("denied"));
    }
}
