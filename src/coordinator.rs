//! The bridge between the blocking control loop thread and the async
//! control surface: a `Mutex`-guarded `Timetable` plus a `Condvar` used to
//! wake the control loop as soon as soon as a setting changes, instead of
//! waiting out the rest of its poll interval.
//!
//! This is the concrete answer to the cross-task wake-up question spec.md
//! §9 leaves open: the control loop is a plain OS thread parked on
//! `Condvar::wait_timeout`, and the control surface (an async task) calls
//! `notify_one` after every accepted mutation. Neither side needs to know
//! the other exists.

use crate::timetable::Timetable;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Shared, `Arc`-cloneable handle to the timetable plus its wake signal.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    timetable: Mutex<Timetable>,
    changed: Condvar,
}

impl Coordinator {
    #[must_use]
    pub fn new(timetable: Timetable) -> Self {
        Self {
            inner: Arc::new(Inner {
                timetable: Mutex::new(timetable),
                changed: Condvar::new(),
            }),
        }
    }

    /// Run `f` with exclusive access to the timetable, without waking
    /// waiters (use for read-only access).
    pub fn with<R>(&self, f: impl FnOnce(&Timetable) -> R) -> R {
        let guard = self.lock();
        f(&guard)
    }

    /// Run `f` with exclusive mutable access, then notify the control loop
    /// that something may have changed. `f` returning `Err` still counts as
    /// "something happened" for notification purposes, matching the
    /// original daemon's behaviour of waking the loop on `/settings` POST
    /// regardless of whether every field validated.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Timetable) -> R) -> R {
        let result = {
            let mut guard = self.lock_mut();
            f(&mut guard)
        };
        self.inner.changed.notify_one();
        result
    }

    fn lock(&self) -> MutexGuard<'_, Timetable> {
        self.inner
            .timetable
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_mut(&self) -> MutexGuard<'_, Timetable> {
        self.lock()
    }

    /// Block the calling thread until either `timeout` elapses or another
    /// thread calls a mutating `with_mut`. Returns the elapsed-without-wake
    /// flag as `true` when the timeout fired first.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (_guard, result) = self
            .inner
            .changed
            .wait_timeout(guard, timeout)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        result.timed_out()
    }

    /// Wake any thread parked in `wait_timeout` immediately, used during
    /// shutdown to unblock the control loop without waiting for its next
    /// poll deadline.
    pub fn notify(&self) {
        self.inner.changed.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::schedule::Temperature;
    use crate::timetable::Mode;
    use std::thread;

    fn sample_timetable() -> Timetable {
        let mut tt = Timetable::new("/tmp/coordinator-test.json");
        tt.load(&crate::timetable::minimal_json(
            Mode::Off,
            crate::timetable::Anchors {
                t0: 5.0,
                tmin: 10.0,
                tmax: 20.0,
            },
            0.5,
        ))
        .expect("valid json");
        let _ = Temperature::T0;
        tt
    }

    #[test]
    fn with_mut_wakes_a_parked_waiter() {
        let coordinator = Coordinator::new(sample_timetable());
        let waiter = coordinator.clone();

        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(5)));

        // Give the waiter a head start to park on the condvar.
        thread::sleep(Duration::from_millis(20));
        coordinator.with_mut(|tt| {
            tt.apply_batch(&[("mode".to_string(), "on".to_string())])
                .expect("valid mutation");
        });

        let timed_out = handle.join().expect("waiter thread joins");
        assert!(!timed_out, "wait_timeout should have returned on notify, not on timeout");
    }

    #[test]
    fn wait_timeout_without_mutation_times_out() {
        let coordinator = Coordinator::new(sample_timetable());
        let timed_out = coordinator.wait_timeout(Duration::from_millis(20));
        assert!(timed_out);
    }

    #[test]
    fn with_gives_read_only_access() {
        let coordinator = Coordinator::new(sample_timetable());
        let mode = coordinator.with(crate::timetable::Timetable::mode);
        assert_eq!(mode, Mode::Off);
    }
}
