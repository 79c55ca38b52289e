//! The periodic sampler: reads the thermometer, asks the timetable whether
//! the equipment should be active, drives the actuator, and publishes a
//! status snapshot. Runs on a plain OS thread so it can block on
//! `Coordinator::wait_timeout` between samples, parked until either the
//! poll interval elapses or a settings change wakes it early.

use crate::actuator::Actuator;
use crate::coordinator::Coordinator;
use crate::status::{StatusBus, ThermodStatus};
use crate::thermometer::Thermometer;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Consecutive unexpected sensor or actuator errors tolerated before the
/// control loop gives up and shuts the equipment off (spec.md §4.4).
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Signals the control loop should stop at the next opportunity. Shared
/// with the shutdown handler installed in `main.rs`.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether `trigger` has been called. Exposed so the control surface's
    /// graceful-shutdown future can poll the same flag the control loop
    /// checks between samples.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.is_set()
    }

    fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the control loop stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `ShutdownFlag` was triggered (normal shutdown request).
    Requested,
    /// Too many consecutive sensor errors.
    SensorFailure,
    /// Too many consecutive actuator errors.
    ActuatorFailure,
}

/// Owns the thermometer and actuator trait objects and runs the sampling
/// loop described in spec.md §4.4.
pub struct ControlLoop {
    coordinator: Coordinator,
    thermometer: Box<dyn Thermometer>,
    actuator: Box<dyn Actuator>,
    status_bus: StatusBus,
    poll_interval: Duration,
    shutdown: ShutdownFlag,
}

impl ControlLoop {
    #[must_use]
    pub fn new(
        coordinator: Coordinator,
        thermometer: Box<dyn Thermometer>,
        actuator: Box<dyn Actuator>,
        status_bus: StatusBus,
        poll_interval: Duration,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            coordinator,
            thermometer,
            actuator,
            status_bus,
            poll_interval,
            shutdown,
        }
    }

    /// Run until `shutdown` is triggered or the error budget is exhausted.
    /// Always attempts to switch the equipment off exactly once before
    /// returning, regardless of why the loop stopped.
    pub fn run(mut self) -> StopReason {
        let mut consecutive_errors: u32 = 0;

        let stop_reason = loop {
            if self.shutdown.is_set() {
                break StopReason::Requested;
            }

            match self.sample_once() {
                Ok(()) => consecutive_errors = 0,
                Err(SampleError::Sensor(message)) => {
                    consecutive_errors += 1;
                    warn!("sensor read failed ({consecutive_errors}/{MAX_CONSECUTIVE_ERRORS}): {message}");
                    self.publish_error("sensor error", message);
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!("too many consecutive sensor errors, shutting down");
                        break StopReason::SensorFailure;
                    }
                }
                Err(SampleError::Actuator(message)) => {
                    consecutive_errors += 1;
                    warn!("actuator operation failed ({consecutive_errors}/{MAX_CONSECUTIVE_ERRORS}): {message}");
                    self.publish_error("actuator error", message);
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!("too many consecutive actuator errors, shutting down");
                        break StopReason::ActuatorFailure;
                    }
                }
            }

            if self.shutdown.is_set() {
                break StopReason::Requested;
            }
            self.coordinator.notify_after_wait(self.poll_interval);
        };

        self.shut_down();
        stop_reason
    }

    fn sample_once(&mut self) -> Result<(), SampleError> {
        let current_temperature = self
            .thermometer
            .temperature()
            .map_err(|e| SampleError::Sensor(e.to_string()))?;

        let actuator_is_on = self
            .actuator
            .is_on()
            .map_err(|e| SampleError::Actuator(e.to_string()))?;
        let switch_off_time = self.actuator.switch_off_time();

        let (want_active, mode, target) = self.coordinator.with(|tt| {
            (
                tt.should_be_active(current_temperature, actuator_is_on, switch_off_time, None),
                tt.mode(),
                tt.target_temperature(None),
            )
        });

        if want_active != actuator_is_on {
            debug!("switching actuator {}", if want_active { "on" } else { "off" });
            self.actuator
                .switch(want_active)
                .map_err(|e| SampleError::Actuator(e.to_string()))?;
        }

        self.status_bus.publish(ThermodStatus::ok(
            Some(current_temperature),
            target,
            want_active,
            mode,
            now_timestamp(),
        ));

        Ok(())
    }

    /// Publish a status reflecting a failed tick (spec.md §4.5 step 2),
    /// carrying forward the timetable's current mode and target so a
    /// `/status/heating` reader still sees what the schedule wants, even
    /// though the actuator's true state for this tick is unknown.
    fn publish_error(&self, label: &str, explain: String) {
        let (mode, target) = self
            .coordinator
            .with(|tt| (tt.mode(), tt.target_temperature(None)));
        self.status_bus.publish(ThermodStatus::failed(
            None,
            target,
            false,
            mode,
            now_timestamp(),
            label,
            explain,
        ));
    }

    fn shut_down(&mut self) {
        info!("control loop stopping, switching actuator off");
        if let Err(e) = self.actuator.switch(false) {
            error!("failed to switch actuator off during shutdown: {e}");
        }
        let mode = self.coordinator.with(crate::timetable::Timetable::mode);
        self.status_bus.publish(ThermodStatus::ok(
            None,
            0.0,
            false,
            mode,
            now_timestamp(),
        ));
    }
}

enum SampleError {
    Sensor(String),
    Actuator(String),
}

fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

impl Coordinator {
    /// Park until either `timeout` elapses or a settings mutation wakes
    /// this thread early. Distinct name from `wait_timeout` so call sites
    /// in the control loop read as "wait, then continue" rather than
    /// exposing the boolean timed-out flag the lower-level primitive
    /// returns.
    fn notify_after_wait(&self, timeout: Duration) {
        let _timed_out = self.wait_timeout(timeout);
    }
}
