//! Shared outlier policy for thermometers backed by more than one physical
//! sensor (multiple 1-Wire devices, multiple analog channels): population
//! standard deviation across sources gates a once-only warning, and the
//! surviving value is the median of all sources (or their mean if there are
//! exactly two).
//!
//! Grounded on the near-identical `raw_temperature` bodies of
//! `OneWireThermometer` and `PiAnalogZeroThermometer` in
//! `examples/original_source/thermod/thermometer.py` — the original even
//! notes in a comment that the two blocks "are the same... remember to
//! modify both", which is exactly the duplication this shared helper removes.

use log::warn;

/// Tracks whether the standard-deviation warning has already fired for the
/// current run of out-of-range readings, so it logs once per excursion
/// rather than on every tick.
#[derive(Debug, Default)]
pub struct OutlierPolicy {
    max_stddev: f64,
    warned: bool,
}

impl OutlierPolicy {
    #[must_use]
    pub const fn new(max_stddev: f64) -> Self {
        Self {
            max_stddev,
            warned: false,
        }
    }

    /// Combine readings from multiple sources into a single value, warning
    /// exactly once (until a subsequent in-range reading resets the flag)
    /// when the population standard deviation exceeds `max_stddev`.
    ///
    /// Returns `None` if `readings` is empty — the caller must surface a
    /// sensor error in that case (spec.md §4.1's "zero sources are
    /// readable" failure).
    pub fn combine(&mut self, readings: &[f64], label: &str) -> Option<f64> {
        if readings.is_empty() {
            return None;
        }

        let std = population_stddev(readings);
        if std >= self.max_stddev {
            if !self.warned {
                self.warned = true;
                warn!(
                    "{label} standard deviation is {std:.2}, greater than the maximum allowed value of {:.2} ({readings:?})",
                    self.max_stddev
                );
            }
        } else {
            self.warned = false;
        }

        Some(match readings.len() {
            2 => (readings[0] + readings[1]) / 2.0,
            _ => median(readings),
        })
    }
}

fn population_stddev(values: &[f64]) -> f64 {
    #[allow(
        clippy::cast_precision_loss,
        reason = "sensor counts never approach f64's precision limit"
    )]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_readings_are_averaged() {
        let mut policy = OutlierPolicy::new(2.0);
        let combined = policy.combine(&[20.0, 20.4], "test").expect("non-empty");
        assert!((combined - 20.2).abs() < 1e-9);
    }

    #[test]
    fn three_or_more_readings_use_the_median() {
        let mut policy = OutlierPolicy::new(2.0);
        let combined = policy
            .combine(&[19.0, 40.0, 20.0], "test")
            .expect("non-empty");
        assert!((combined - 20.0).abs() < 1e-9);
    }

    #[test]
    fn empty_readings_yield_none() {
        let mut policy = OutlierPolicy::new(2.0);
        assert!(policy.combine(&[], "test").is_none());
    }

    #[test]
    fn warns_only_once_until_back_in_range() {
        let mut policy = OutlierPolicy::new(1.0);
        assert!(!policy.warned);
        policy.combine(&[10.0, 20.0], "test");
        assert!(policy.warned);
        policy.combine(&[10.0, 20.0], "test");
        assert!(policy.warned);
        policy.combine(&[10.0, 10.5], "test");
        assert!(!policy.warned);
    }
}
