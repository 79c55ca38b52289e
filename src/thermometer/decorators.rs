//! Decorators that compose around a raw `Thermometer`: scale conversion,
//! redundant-sensor agreement checking, and time-windowed averaging.
//!
//! Grounded on the three decorator classes in
//! `examples/original_source/thermod/thermometer.py`:
//! `ScaleAdapterThermometerDecorator`,
//! `SimilarityCheckerThermometerDecorator`, and
//! `AveragingTaskThermometerDecorator`.

use super::calibration::{celsius_to_fahrenheit, fahrenheit_to_celsius, Calibration};
use super::{Scale, Thermometer, ThermometerError};
use std::collections::VecDeque;

/// Applies a calibration fit and converts between Celsius and Fahrenheit so
/// every thermometer presents Celsius readings to the rest of the daemon,
/// regardless of what scale the underlying sensor reports in.
pub struct ScaleAdapter<T> {
    inner: T,
    native_scale: Scale,
    calibration: Calibration,
}

impl<T: Thermometer> ScaleAdapter<T> {
    #[must_use]
    pub const fn new(inner: T, native_scale: Scale, calibration: Calibration) -> Self {
        Self {
            inner,
            native_scale,
            calibration,
        }
    }
}

impl<T: Thermometer> Thermometer for ScaleAdapter<T> {
    fn temperature(&mut self) -> Result<f64, ThermometerError> {
        let raw = self.inner.temperature()?;
        let celsius = match self.native_scale {
            Scale::Celsius => raw,
            Scale::Fahrenheit => fahrenheit_to_celsius(raw),
        };
        let calibrated = self.calibration.apply(celsius);
        if calibrated.is_finite() {
            Ok(calibrated)
        } else {
            Err(ThermometerError::OutOfRange(calibrated))
        }
    }

    fn close(&mut self) -> Result<(), ThermometerError> {
        self.inner.close()
    }
}

/// Re-expresses a Celsius reading in Fahrenheit for callers that want the
/// other scale (used by the control surface's `?scale=` query parameter).
#[must_use]
pub fn as_fahrenheit(celsius: f64) -> f64 {
    celsius_to_fahrenheit(celsius)
}

/// Rejects a new reading if it strays too far from the mean of a bounded
/// history of older raw readings, otherwise appends it to the history.
/// Grounded on `SimilarityCheckerThermometerDecorator` in
/// `examples/original_source/thermod/thermometer.py`: this decorator wraps a
/// *single* sensor and checks it against its own recent past, unlike
/// [`super::outlier::OutlierPolicy`], which compares several simultaneous
/// sensors against each other.
pub struct SimilarityChecker<T> {
    inner: T,
    history: VecDeque<f64>,
    capacity: usize,
    delta: f64,
}

impl<T: Thermometer> SimilarityChecker<T> {
    /// `capacity` is the number of older readings kept for comparison;
    /// `delta` is the maximum allowed distance from their mean.
    #[must_use]
    pub fn new(inner: T, capacity: usize, delta: f64) -> Self {
        Self {
            inner,
            history: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            delta,
        }
    }
}

impl<T: Thermometer> Thermometer for SimilarityChecker<T> {
    fn temperature(&mut self) -> Result<f64, ThermometerError> {
        let reading = self.inner.temperature()?;

        if let Some(mean) = mean(&self.history) {
            if (reading - mean).abs() >= self.delta {
                return Err(ThermometerError::Disagreement);
            }
        }

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(reading);
        Ok(reading)
    }

    fn close(&mut self) -> Result<(), ThermometerError> {
        self.inner.close()
    }
}

fn mean(values: &VecDeque<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    #[allow(
        clippy::cast_precision_loss,
        reason = "history sizes are small; no meaningful precision is lost"
    )]
    let len = values.len() as f64;
    Some(values.iter().sum::<f64>() / len)
}

/// Keeps a fixed-capacity ring buffer of raw readings and reports a trimmed
/// mean, dropping the top and bottom `skipval / 2` fraction before
/// averaging. Grounded on `AveragingTaskThermometerDecorator` in
/// `examples/original_source/thermod/thermometer.py`: the original runs a
/// background task sampling every `short_interval` seconds into a queue of
/// `averaging_time * 60 / short_interval` slots; here the same ring buffer
/// is filled lazily on each `temperature()` call instead of by an owned
/// background task, since the control loop already drives the sampling
/// cadence.
pub struct AveragingWindow<T> {
    inner: T,
    samples: VecDeque<f64>,
    capacity: usize,
    skipval: f64,
}

impl<T: Thermometer> AveragingWindow<T> {
    /// `capacity` is `averaging_time * 60 / short_interval` (spec.md §4.1);
    /// `skipval` is the fraction, in `[0, 1]`, of readings trimmed from each
    /// extreme once the buffer is full. Out-of-range values are clamped into
    /// `[0, 1]` rather than trusted, since a misconfigured `skipval` above 1
    /// could otherwise push the trim past the middle of the buffer.
    #[must_use]
    pub fn new(inner: T, capacity: usize, skipval: f64) -> Self {
        Self {
            inner,
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            skipval: skipval.clamp(0.0, 1.0),
        }
    }
}

impl<T: Thermometer> Thermometer for AveragingWindow<T> {
    fn temperature(&mut self) -> Result<f64, ThermometerError> {
        let reading = self.inner.temperature()?;
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(reading);

        if self.samples.len() < self.capacity {
            #[allow(
                clippy::cast_precision_loss,
                reason = "window sizes are small; no meaningful precision is lost"
            )]
            let len = self.samples.len() as f64;
            return Ok(self.samples.iter().sum::<f64>() / len);
        }

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        #[allow(
            clippy::cast_precision_loss,
            reason = "window sizes are small; no meaningful precision is lost"
        )]
        let skip = ((self.capacity as f64) * self.skipval / 2.0).round() as usize;
        let end = sorted.len().saturating_sub(skip);
        let start = skip.min(end);
        let trimmed = &sorted[start..end];

        #[allow(
            clippy::cast_precision_loss,
            reason = "window sizes are small; no meaningful precision is lost"
        )]
        let len = trimmed.len().max(1) as f64;
        Ok(trimmed.iter().sum::<f64>() / len)
    }

    fn close(&mut self) -> Result<(), ThermometerError> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thermometer::variants::ConstantThermometer;

    #[test]
    fn scale_adapter_converts_fahrenheit_and_calibrates() {
        let mut thermometer = ScaleAdapter::new(
            ConstantThermometer::fixed(98.6),
            Scale::Fahrenheit,
            Calibration::identity(),
        );
        let reading = thermometer.temperature().expect("valid reading");
        assert!((reading - 37.0).abs() < 1e-6);
    }

    #[test]
    fn similarity_checker_accepts_a_reading_close_to_history() {
        let mut checker = SimilarityChecker::new(
            ConstantThermometer::sequence(vec![20.0, 20.4, 20.1]),
            5,
            0.5,
        );
        assert!((checker.temperature().expect("first reading, no history yet") - 20.0).abs() < 1e-9);
        assert!((checker.temperature().expect("close to history") - 20.4).abs() < 1e-9);
    }

    #[test]
    fn similarity_checker_rejects_a_reading_far_from_history() {
        let mut checker =
            SimilarityChecker::new(ConstantThermometer::sequence(vec![20.0, 35.0]), 5, 0.5);
        checker.temperature().expect("first reading seeds history");
        assert!(matches!(
            checker.temperature(),
            Err(ThermometerError::Disagreement)
        ));
    }

    #[test]
    fn averaging_window_grows_mean_until_full_then_trims_extremes() {
        let mut window =
            AveragingWindow::new(ConstantThermometer::sequence(vec![10.0, 20.0, 30.0, 1000.0]), 3, 0.67);
        assert!((window.temperature().expect("first") - 10.0).abs() < 1e-9);
        assert!((window.temperature().expect("second") - 15.0).abs() < 1e-9);
        assert!((window.temperature().expect("third") - 20.0).abs() < 1e-9);
        // buffer is now full at [10, 20, 30]; pushing 1000 evicts the 10,
        // leaving [20, 30, 1000] with skip=round(3*0.67/2)=1 trimming both
        // extremes and returning just the middle value.
        assert!((window.temperature().expect("fourth") - 30.0).abs() < 1e-9);
    }

    #[test]
    fn averaging_window_does_not_panic_when_skip_would_exceed_capacity() {
        // capacity=3, skipval=1.0 gives skip=round(3*1.0/2)=2, so trimming
        // both extremes by 2 would otherwise require slicing sorted[2..1].
        let mut window =
            AveragingWindow::new(ConstantThermometer::sequence(vec![10.0, 20.0, 30.0, 40.0]), 3, 1.0);
        window.temperature().expect("first");
        window.temperature().expect("second");
        window.temperature().expect("third");
        let reading = window.temperature().expect("fourth, buffer now full");
        assert!(reading.is_finite());
    }

    #[test]
    fn averaging_window_clamps_an_out_of_range_skipval() {
        let mut window =
            AveragingWindow::new(ConstantThermometer::sequence(vec![1.0, 2.0, 3.0, 4.0]), 3, 5.0);
        assert!((0.0..=1.0).contains(&window.skipval));
        window.temperature().expect("first");
        window.temperature().expect("second");
        window.temperature().expect("third");
        let reading = window.temperature().expect("fourth, buffer now full");
        assert!(reading.is_finite());
    }
}
