//! Concrete `Actuator` implementations: an external-script bridge speaking
//! the `{success, status, error}` JSON protocol from
//! `examples/original_source/thermod/heating.py`'s `ScriptHeating`, and an
//! optional GPIO relay behind the `gpio` feature.

use super::{Actuator, ActuatorError};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Command;
use std::time::SystemTime;

/// The JSON object every helper script (`switchon`, `switchoff`, `status`)
/// prints to stdout.
#[derive(Debug, Deserialize)]
struct ScriptReply {
    success: bool,
    #[serde(default)]
    status: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

/// Drives the equipment through three external helper programs, one each
/// for switching on, switching off, and querying status.
pub struct ScriptActuator {
    switch_on: PathBuf,
    switch_off: PathBuf,
    status: PathBuf,
    switch_off_time: SystemTime,
}

impl ScriptActuator {
    #[must_use]
    pub fn new(switch_on: PathBuf, switch_off: PathBuf, status: PathBuf) -> Self {
        Self {
            switch_on,
            switch_off,
            status,
            switch_off_time: SystemTime::UNIX_EPOCH,
        }
    }

    fn run(program: &PathBuf) -> Result<ScriptReply, ActuatorError> {
        let output = Command::new(program)
            .output()
            .map_err(|e| ActuatorError::SwitchFailed(e.to_string()))?;
        let reply: ScriptReply = serde_json::from_slice(&output.stdout)
            .map_err(|e| ActuatorError::SwitchFailed(format!("malformed reply: {e}")))?;
        if reply.success {
            Ok(reply)
        } else {
            Err(ActuatorError::SwitchFailed(
                reply.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

impl Actuator for ScriptActuator {
    fn switch(&mut self, on: bool) -> Result<(), ActuatorError> {
        let program = if on { &self.switch_on } else { &self.switch_off };
        Self::run(program)?;
        if !on {
            self.switch_off_time = SystemTime::now();
        }
        Ok(())
    }

    fn is_on(&mut self) -> Result<bool, ActuatorError> {
        let reply = Self::run(&self.status)?;
        reply
            .status
            .ok_or_else(|| ActuatorError::StatusFailed("status script omitted `status`".to_string()))
    }

    fn switch_off_time(&self) -> SystemTime {
        self.switch_off_time
    }
}

/// Drives a relay wired to a Raspberry Pi GPIO pin. Only compiled when the
/// `gpio` feature is enabled, since it depends on `rppal` and real
/// hardware.
#[cfg(feature = "gpio")]
pub struct GpioActuator {
    pin: rppal::gpio::OutputPin,
    active_high: bool,
    is_on: bool,
    switch_off_time: SystemTime,
}

#[cfg(feature = "gpio")]
impl GpioActuator {
    /// # Errors
    /// Returns [`ActuatorError::InvalidPin`] if `pin_number` is outside
    /// the Raspberry Pi's supported GPIO range, or
    /// [`ActuatorError::SwitchFailed`] if the pin cannot be claimed.
    pub fn new(pin_number: u8, active_high: bool) -> Result<Self, ActuatorError> {
        if pin_number > 27 {
            return Err(ActuatorError::InvalidPin(pin_number));
        }
        let gpio = rppal::gpio::Gpio::new()
            .map_err(|e| ActuatorError::SwitchFailed(e.to_string()))?;
        let mut pin = gpio
            .get(pin_number)
            .map_err(|e| ActuatorError::SwitchFailed(e.to_string()))?
            .into_output();
        if active_high {
            pin.set_low();
        } else {
            pin.set_high();
        }
        Ok(Self {
            pin,
            active_high,
            is_on: false,
            switch_off_time: SystemTime::UNIX_EPOCH,
        })
    }
}

#[cfg(feature = "gpio")]
impl Actuator for GpioActuator {
    fn switch(&mut self, on: bool) -> Result<(), ActuatorError> {
        let drive_high = on == self.active_high;
        if drive_high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        self.is_on = on;
        if !on {
            self.switch_off_time = SystemTime::now();
        }
        Ok(())
    }

    fn is_on(&mut self) -> Result<bool, ActuatorError> {
        Ok(self.is_on)
    }

    fn switch_off_time(&self) -> SystemTime {
        self.switch_off_time
    }
}

/// An in-memory fixture used by the control loop's own tests.
pub struct MockActuator {
    is_on: bool,
    switch_off_time: SystemTime,
    pub switch_calls: Vec<bool>,
}

impl Default for MockActuator {
    fn default() -> Self {
        Self {
            is_on: false,
            switch_off_time: SystemTime::UNIX_EPOCH,
            switch_calls: Vec::new(),
        }
    }
}

impl Actuator for MockActuator {
    fn switch(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.switch_calls.push(on);
        self.is_on = on;
        if !on {
            self.switch_off_time = SystemTime::now();
        }
        Ok(())
    }

    fn is_on(&mut self) -> Result<bool, ActuatorError> {
        Ok(self.is_on)
    }

    fn switch_off_time(&self) -> SystemTime {
        self.switch_off_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_actuator_tracks_switch_history() {
        let mut actuator = MockActuator::default();
        actuator.switch(true).expect("switch on succeeds");
        actuator.switch(false).expect("switch off succeeds");
        assert_eq!(actuator.switch_calls, vec![true, false]);
        assert!(!actuator.is_on().expect("status query succeeds"));
    }

    #[test]
    fn mock_actuator_starts_off_since_epoch() {
        let actuator = MockActuator::default();
        assert_eq!(actuator.switch_off_time(), SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn mock_actuator_records_switch_off_time_on_transition() {
        let mut actuator = MockActuator::default();
        actuator.switch(true).expect("switch on succeeds");
        actuator.switch(false).expect("switch off succeeds");
        assert!(actuator.switch_off_time() > SystemTime::UNIX_EPOCH);
    }
}
