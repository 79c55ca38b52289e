//! Concrete `Thermometer` implementations: an external helper program, one
//! or more filesystem-backed 1-Wire sensors, an analog A/D-converter bridge,
//! and an in-memory fixture for tests.

use super::outlier::OutlierPolicy;
use super::{Thermometer, ThermometerError};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Command;

/// The JSON object the thermometer helper script prints to stdout
/// (spec.md §4.1(a)): `{"temperature": <number>, "error": <string|null>}`.
#[derive(Debug, Deserialize)]
struct ScriptReply {
    temperature: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// Invokes an external program and parses its `{temperature, error}` JSON
/// reply, mirroring `ScriptThermometer` in
/// `examples/original_source/thermod/thermometer.py`.
pub struct ScriptThermometer {
    program: PathBuf,
    args: Vec<String>,
}

impl ScriptThermometer {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Thermometer for ScriptThermometer {
    fn temperature(&mut self) -> Result<f64, ThermometerError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| ThermometerError::ReadFailed(e.to_string()))?;

        let reply: ScriptReply = serde_json::from_slice(&output.stdout).map_err(|e| {
            ThermometerError::ReadFailed(format!(
                "{} produced malformed output: {e}",
                self.program.display()
            ))
        })?;

        if !output.status.success() {
            return Err(ThermometerError::ReadFailed(reply.error.unwrap_or_else(
                || {
                    format!(
                        "{} exited with {}",
                        self.program.display(),
                        output.status
                    )
                },
            )));
        }

        let value = reply.temperature.ok_or_else(|| {
            ThermometerError::ReadFailed(format!(
                "{} did not report a temperature",
                self.program.display()
            ))
        })?;

        if value.is_finite() {
            Ok(value)
        } else {
            Err(ThermometerError::OutOfRange(value))
        }
    }
}

fn parse_w1_slave(contents: &str) -> Option<f64> {
    if !contents.lines().next()?.trim_end().ends_with("YES") {
        return None;
    }
    let marker = contents.rsplit("t=").next()?;
    let digits: String = marker.chars().take_while(char::is_ascii_digit).collect();
    let millidegrees: f64 = digits.parse().ok()?;
    Some(millidegrees / 1000.0)
}

/// Reads one or more `w1_slave`-style 1-Wire device files (temperature
/// reported in millidegrees Celsius after a `t=` marker on the last line)
/// and combines them with the shared [`OutlierPolicy`] (spec.md §4.1's
/// "Outlier policy"), matching `OneWireThermometer.raw_temperature` in
/// `examples/original_source/thermod/thermometer.py`.
pub struct OneWireThermometer {
    device_paths: Vec<PathBuf>,
    outliers: OutlierPolicy,
}

impl OneWireThermometer {
    #[must_use]
    pub const fn new(device_paths: Vec<PathBuf>, max_stddev: f64) -> Self {
        Self {
            device_paths,
            outliers: OutlierPolicy::new(max_stddev),
        }
    }
}

impl Thermometer for OneWireThermometer {
    fn temperature(&mut self) -> Result<f64, ThermometerError> {
        let mut readings = Vec::with_capacity(self.device_paths.len());
        for path in &self.device_paths {
            match std::fs::read_to_string(path) {
                Ok(contents) => match parse_w1_slave(&contents) {
                    Some(value) => readings.push(value),
                    None => log::warn!("1-wire device {} not ready, keep going without it", path.display()),
                },
                Err(e) => log::warn!("cannot access 1-wire device {}: {e}", path.display()),
            }
        }

        self.outliers
            .combine(&readings, "1-wire temperatures")
            .ok_or_else(|| {
                ThermometerError::ReadFailed(
                    "no temperature retrieved, all 1-wire devices are unready or unavailable"
                        .to_string(),
                )
            })
    }
}

/// Reference voltage (millivolts) for the resistor-divider formula used to
/// convert an A/D converter's normalized reading into degrees Celsius,
/// grounded on `PiAnalogZeroThermometer._vref` in
/// `examples/original_source/thermod/thermometer.py`.
const ANALOG_VREF_MILLIVOLTS: f64 = (3.32 / (3.32 + 7.5)) * 3.3 * 1000.0;

/// Reads one or more analog-to-digital channels (each a normalized `0.0..1.0`
/// sample) and converts through the known reference-voltage formula, then
/// combines multiple channels with the shared [`OutlierPolicy`].
pub struct AnalogThermometer<R> {
    read_channel: R,
    channels: Vec<u8>,
    outliers: OutlierPolicy,
}

impl<R: FnMut(u8) -> Result<f64, ThermometerError> + Send> AnalogThermometer<R> {
    #[must_use]
    pub const fn new(read_channel: R, channels: Vec<u8>, max_stddev: f64) -> Self {
        Self {
            read_channel,
            channels,
            outliers: OutlierPolicy::new(max_stddev),
        }
    }
}

impl<R: FnMut(u8) -> Result<f64, ThermometerError> + Send> Thermometer for AnalogThermometer<R> {
    fn temperature(&mut self) -> Result<f64, ThermometerError> {
        let mut readings = Vec::with_capacity(self.channels.len());
        for &channel in &self.channels {
            let normalized = (self.read_channel)(channel)?;
            readings.push((normalized * ANALOG_VREF_MILLIVOLTS - 500.0) / 10.0);
        }

        self.outliers
            .combine(&readings, "analog channel temperatures")
            .ok_or_else(|| {
                ThermometerError::ReadFailed("no analog channels configured".to_string())
            })
    }
}

/// A fixed or sequenced value source used by tests and by the control
/// loop's own test suite; not backed by any real hardware.
pub struct ConstantThermometer {
    readings: Vec<f64>,
    next: usize,
}

impl ConstantThermometer {
    #[must_use]
    pub fn fixed(value: f64) -> Self {
        Self {
            readings: vec![value],
            next: 0,
        }
    }

    #[must_use]
    pub fn sequence(readings: Vec<f64>) -> Self {
        Self { readings, next: 0 }
    }
}

impl Thermometer for ConstantThermometer {
    fn temperature(&mut self) -> Result<f64, ThermometerError> {
        let value = *self
            .readings
            .get(self.next.min(self.readings.len() - 1))
            .ok_or_else(|| ThermometerError::ReadFailed("no readings configured".to_string()))?;
        if self.next + 1 < self.readings.len() {
            self.next += 1;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_w1_slave_extracts_millidegrees() {
        let contents = "a3 01 4b 46 7f ff 0c 10 d8 : crc=d8 YES\na3 01 4b 46 7f ff 0c 10 d8 t=26187\n";
        let value = parse_w1_slave(contents).expect("well-formed sample");
        assert!((value - 26.187).abs() < 1e-9);
    }

    #[test]
    fn parse_w1_slave_rejects_not_ready_device() {
        let contents = "a3 01 4b 46 7f ff 0c 10 d8 : crc=d8 NO\na3 01 4b 46 7f ff 0c 10 d8 t=26187\n";
        assert!(parse_w1_slave(contents).is_none());
    }

    #[test]
    fn constant_thermometer_advances_then_holds_last_value() {
        let mut thermometer = ConstantThermometer::sequence(vec![19.5, 20.0, 20.5]);
        assert_eq!(thermometer.temperature().expect("first reading"), 19.5);
        assert_eq!(thermometer.temperature().expect("second reading"), 20.0);
        assert_eq!(thermometer.temperature().expect("third reading"), 20.5);
        assert_eq!(thermometer.temperature().expect("holds last reading"), 20.5);
    }

    #[test]
    fn analog_thermometer_combines_channels_via_outlier_policy() {
        let mut thermometer = AnalogThermometer::new(
            |_channel| Ok(0.5_f64),
            vec![0, 1],
            2.0,
        );
        let reading = thermometer.temperature().expect("both channels agree");
        let expected = (0.5 * ANALOG_VREF_MILLIVOLTS - 500.0) / 10.0;
        assert!((reading - expected).abs() < 1e-9);
    }
}
