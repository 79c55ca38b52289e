//! The actuator abstraction: whatever actually turns the heating or
//! cooling equipment on and off.
//!
//! `examples/original_source/thermod/heating.py` and `cooling.py` modeled
//! heating and cooling as two class hierarchies, with `cooling.py` doing
//! little more than subclassing `heating.py` and inverting a comparison —
//! the REDESIGN FLAG in spec.md §9(c) replaces that with one `Actuator`
//! trait plus a [`Semantic`] the timetable's decision function reads.

pub mod variants;

pub use crate::timetable::ActuatorSemantic as Semantic;
use std::time::SystemTime;

/// Errors an actuator implementation can raise (spec.md's Actuator error
/// family).
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("failed to switch actuator: {0}")]
    SwitchFailed(String),
    #[error("failed to query actuator status: {0}")]
    StatusFailed(String),
    #[error("GPIO pin {0} is out of the supported range 0-27")]
    InvalidPin(u8),
}

/// Whatever turns the equipment on and off: a relay, a script, a GPIO pin.
pub trait Actuator: Send {
    /// Switch the equipment on or off. Implementations should be
    /// idempotent: switching on an already-on actuator is not an error.
    ///
    /// # Errors
    /// Returns [`ActuatorError`] when the underlying switch fails.
    fn switch(&mut self, on: bool) -> Result<(), ActuatorError>;

    /// Query whether the equipment currently reports itself on.
    ///
    /// # Errors
    /// Returns [`ActuatorError`] when the underlying status query fails.
    fn is_on(&mut self) -> Result<bool, ActuatorError>;

    /// The moment the actuator was last switched off, used to bound grace
    /// time. Implementations should initialize this to the Unix epoch
    /// (`SystemTime::UNIX_EPOCH`), matching `BaseHeating.__switch_off_time`
    /// in the original daemon, so that a freshly started daemon treats the
    /// equipment as having been off "forever".
    fn switch_off_time(&self) -> SystemTime;
}

#[cfg(test)]
mod tests {
    use super::Semantic;

    #[test]
    fn semantic_default_is_heating() {
        assert_eq!(Semantic::default(), Semantic::Heating);
    }
}
