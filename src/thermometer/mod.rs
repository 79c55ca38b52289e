//! The thermometer abstraction: a single `Thermometer` trait implemented by
//! a handful of raw sensor variants, wrapped by decorators that add scale
//! conversion, similarity checking and averaging.
//!
//! Grounded on `examples/original_source/thermod/thermometer.py`
//! (`BaseThermometer`, `ScaleAdapterThermometerDecorator`,
//! `SimilarityCheckerThermometerDecorator`,
//! `AveragingTaskThermometerDecorator`).

pub mod calibration;
pub mod decorators;
pub mod outlier;
pub mod variants;

use std::fmt;

/// Degrees Celsius or Fahrenheit, matching the two scales the original
/// daemon supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Celsius,
    Fahrenheit,
}

/// Errors a thermometer implementation can raise (spec.md's Sensor error
/// family).
#[derive(Debug, thiserror::Error)]
pub enum ThermometerError {
    #[error("failed to read sensor: {0}")]
    ReadFailed(String),
    #[error("sensor returned a non-finite or out-of-range value: {0}")]
    OutOfRange(f64),
    #[error("readings from redundant sensors disagree by more than the configured tolerance")]
    Disagreement,
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Celsius => write!(f, "C"),
            Self::Fahrenheit => write!(f, "F"),
        }
    }
}

/// A source of temperature readings, always expressed in Celsius once past
/// the scale-adapter decorator.
pub trait Thermometer: Send {
    /// Take a single reading, in degrees Celsius.
    ///
    /// # Errors
    /// Returns [`ThermometerError`] when the underlying sensor cannot
    /// produce a reading.
    fn temperature(&mut self) -> Result<f64, ThermometerError>;

    /// Release any held resources (file handles, spawned helper threads).
    /// Default no-op; decorators forward this to their inner thermometer.
    ///
    /// # Errors
    /// Returns [`ThermometerError`] if cleanup fails.
    fn close(&mut self) -> Result<(), ThermometerError> {
        Ok(())
    }
}

/// Lets a decorator wrap a boxed trait object exactly as it would wrap a
/// concrete sensor type, so `main.rs` can compose the decorator stack over
/// whichever variant the configuration selected at runtime.
impl Thermometer for Box<dyn Thermometer> {
    fn temperature(&mut self) -> Result<f64, ThermometerError> {
        (**self).temperature()
    }

    fn close(&mut self) -> Result<(), ThermometerError> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_display_matches_abbreviation() {
        assert_eq!(Scale::Celsius.to_string(), "C");
        assert_eq!(Scale::Fahrenheit.to_string(), "F");
    }
}
