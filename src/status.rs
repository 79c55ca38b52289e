//! The status bus: an edge-triggered, coalescing channel the control loop
//! publishes to and the control surface's `monitor` long-poll endpoint
//! subscribes from.
//!
//! Resolves Open Question (b) in spec.md §9: a long-poll waiter that
//! arrives after several updates have already happened receives only the
//! latest snapshot, never a backlog — exactly the semantics
//! `tokio::sync::watch` already provides, so the bus is a thin wrapper
//! rather than a hand-rolled broadcast queue.

use serde::Serialize;
use tokio::sync::watch;

/// A point-in-time snapshot of the daemon's operating state, published by
/// the control loop after every sampling cycle (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThermodStatus {
    pub current_temperature: Option<f64>,
    pub target_temperature: f64,
    pub actuator_is_on: bool,
    pub mode: crate::timetable::Mode,
    pub timestamp: f64,
    /// Short error label for the tick that produced this snapshot, if any
    /// (spec.md §3's `error?` field).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Full explanation accompanying `error`, if any (spec.md §3's
    /// `explain?` field).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<String>,
}

impl ThermodStatus {
    /// Mark this snapshot as free of errors, the common case after a
    /// successful sampling tick.
    #[must_use]
    pub const fn ok(
        current_temperature: Option<f64>,
        target_temperature: f64,
        actuator_is_on: bool,
        mode: crate::timetable::Mode,
        timestamp: f64,
    ) -> Self {
        Self {
            current_temperature,
            target_temperature,
            actuator_is_on,
            mode,
            timestamp,
            error: None,
            explain: None,
        }
    }

    /// Mark this snapshot as reflecting a tick that failed (spec.md §4.5
    /// step 2: "publish a status with `error` set"). `current_temperature`
    /// is `None` when the failure prevented a reading from being taken at
    /// all.
    #[must_use]
    pub fn failed(
        current_temperature: Option<f64>,
        target_temperature: f64,
        actuator_is_on: bool,
        mode: crate::timetable::Mode,
        timestamp: f64,
        error: &str,
        explain: String,
    ) -> Self {
        Self {
            current_temperature,
            target_temperature,
            actuator_is_on,
            mode,
            timestamp,
            error: Some(error.to_string()),
            explain: Some(explain),
        }
    }
}

/// A single-producer, many-consumer status channel. Every subscriber sees
/// only the most recently published value; values are never queued.
#[derive(Clone)]
pub struct StatusBus {
    sender: watch::Sender<ThermodStatus>,
}

impl StatusBus {
    #[must_use]
    pub fn new(initial: ThermodStatus) -> Self {
        let (sender, _receiver) = watch::channel(initial);
        Self { sender }
    }

    /// Publish a new status, waking every parked `changed()` waiter.
    pub fn publish(&self, status: ThermodStatus) {
        // `send` only fails when every receiver has been dropped, which is
        // not an error condition for a fire-and-forget publisher.
        let _ = self.sender.send(status);
    }

    /// Subscribe to future status updates. The returned receiver starts
    /// even with the bus's current value, so its first `changed()` call
    /// only resolves once a snapshot is published *after* this call — it
    /// will not replay the value that was already current at subscribe
    /// time.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ThermodStatus> {
        self.sender.subscribe()
    }

    /// The most recently published snapshot, without subscribing.
    #[must_use]
    pub fn current(&self) -> ThermodStatus {
        self.sender.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::Mode;

    fn sample_status(temperature: f64) -> ThermodStatus {
        ThermodStatus::ok(Some(temperature), 20.0, false, Mode::Auto, 0.0)
    }

    #[tokio::test]
    async fn subscriber_sees_only_the_latest_snapshot() {
        let bus = StatusBus::new(sample_status(18.0));
        let mut receiver = bus.subscribe();

        bus.publish(sample_status(19.0));
        bus.publish(sample_status(20.0));
        bus.publish(sample_status(21.0));

        receiver.changed().await.expect("sender still alive");
        let latest = receiver.borrow().clone();
        assert_eq!(latest.current_temperature, Some(21.0));
    }

    #[test]
    fn current_reflects_the_last_published_value_without_subscribing() {
        let bus = StatusBus::new(sample_status(18.0));
        bus.publish(sample_status(22.5));
        assert_eq!(bus.current().current_temperature, Some(22.5));
    }
}
