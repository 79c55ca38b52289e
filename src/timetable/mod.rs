//! The timetable engine: the weekly schedule, overrides, thresholds and the
//! decision function that turns `(mode, schedule, current temperature,
//! actuator state, time)` into a boolean "should be active" output.
//!
//! Grounded on `examples/original_source/thermod/timetable.py` and
//! `thermod/const.py`'s JSON schema; the transactional discipline is the
//! Rust analogue of `thermod/memento.py`'s `transactional` decorator.

pub mod schedule;

use crate::error::ThermodError;
use schedule::{Day, Schedule, Temperature};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// The six modes a timetable can operate in (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Auto,
    On,
    Off,
    T0,
    Tmin,
    Tmax,
}

impl Mode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::On => "on",
            Self::Off => "off",
            Self::T0 => "t0",
            Self::Tmin => "tmin",
            Self::Tmax => "tmax",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "auto" => Ok(Self::Auto),
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "t0" => Ok(Self::T0),
            "tmin" => Ok(Self::Tmin),
            "tmax" => Ok(Self::Tmax),
            other => Err(format!("invalid mode `{other}`")),
        }
    }
}

/// The three required anchor temperatures (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Anchors {
    pub t0: f64,
    pub tmin: f64,
    pub tmax: f64,
}

impl Anchors {
    fn validate(self) -> Result<(), String> {
        for (name, value) in [("t0", self.t0), ("tmin", self.tmin), ("tmax", self.tmax)] {
            if !value.is_finite() {
                return Err(format!("anchor `{name}` must be a finite number"));
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn resolve(self, temperature: Temperature) -> f64 {
        match temperature {
            Temperature::Degrees(v) => v,
            Temperature::T0 => self.t0,
            Temperature::Tmin => self.tmin,
            Temperature::Tmax => self.tmax,
        }
    }
}

/// Which direction of comparison counts as "should be active" — resolves
/// REDESIGN FLAG §9(c): one `Actuator` type, a semantic sign instead of
/// subclassing `BaseHeating`/`BaseCooling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActuatorSemantic {
    #[default]
    Heating,
    Cooling,
}

/// A snapshot of every field needed to roll the timetable back on a failed
/// transactional mutation (the Rust analogue of `thermod.memento.memento`).
#[derive(Debug, Clone)]
struct TimetableSnapshot {
    mode: Mode,
    anchors: Anchors,
    schedule: Schedule,
    differential: f64,
    grace_time: Option<f64>,
}

/// The top-level aggregate owned exclusively by the `Coordinator`.
#[derive(Debug, Clone)]
pub struct Timetable {
    mode: Mode,
    anchors: Anchors,
    schedule: Schedule,
    differential: f64,
    grace_time: Option<f64>,
    last_update_timestamp: f64,
    filepath: PathBuf,
    semantic: ActuatorSemantic,
}

/// Wire format matching the normative JSON schema in spec.md §6.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct Wire {
    mode: Mode,
    differential: f64,
    grace_time: Option<f64>,
    temperatures: Anchors,
    timetable: Schedule,
}

fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

impl Timetable {
    /// Create an empty timetable (mode off, zeroed anchors, uniform
    /// schedule) backed by `filepath`. Callers typically follow this with
    /// `load` from the file's contents.
    #[must_use]
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        let anchors = Anchors {
            t0: 0.0,
            tmin: 0.0,
            tmax: 0.0,
        };
        Self {
            mode: Mode::Off,
            anchors,
            schedule: Schedule::uniform(Temperature::Degrees(0.0)),
            differential: 0.0,
            grace_time: None,
            last_update_timestamp: now_timestamp(),
            filepath: filepath.into(),
            semantic: ActuatorSemantic::Heating,
        }
    }

    #[must_use]
    pub const fn with_semantic(mut self, semantic: ActuatorSemantic) -> Self {
        self.semantic = semantic;
        self
    }

    fn snapshot(&self) -> TimetableSnapshot {
        TimetableSnapshot {
            mode: self.mode,
            anchors: self.anchors,
            schedule: self.schedule.clone(),
            differential: self.differential,
            grace_time: self.grace_time,
        }
    }

    fn restore(&mut self, snapshot: TimetableSnapshot) {
        self.mode = snapshot.mode;
        self.anchors = snapshot.anchors;
        self.schedule = snapshot.schedule;
        self.differential = snapshot.differential;
        self.grace_time = snapshot.grace_time;
    }

    fn validate(&self) -> Result<(), String> {
        self.anchors.validate()?;
        if !(0.0..=1.0).contains(&self.differential) {
            return Err("differential must be in [0, 1]".to_string());
        }
        if let Some(grace) = self.grace_time {
            if grace < 0.0 || !grace.is_finite() {
                return Err("grace_time must be >= 0 or null".to_string());
            }
        }
        if !self.schedule.is_complete() {
            return Err("schedule must cover all seven days".to_string());
        }
        Ok(())
    }

    /// Parse and validate a JSON blob, atomically replacing every field.
    /// On schema or value failure, nothing changes (spec.md §4.3).
    pub fn load(&mut self, blob: &str) -> Result<(), ThermodError> {
        let wire: Wire =
            serde_json::from_str(blob).map_err(|e| ThermodError::Validation(e.to_string()))?;

        let restore = self.snapshot();
        self.mode = wire.mode;
        self.anchors = wire.temperatures;
        self.schedule = wire.timetable;
        self.differential = wire.differential;
        self.grace_time = wire.grace_time;

        if let Err(e) = self.validate() {
            self.restore(restore);
            return Err(ThermodError::Validation(e));
        }
        self.bump_timestamp();
        Ok(())
    }

    /// Persist the current state to `filepath` via write-then-rename, the
    /// minimal atomic-replace pattern for a JSON config file.
    pub fn save(&self) -> Result<(), ThermodError> {
        let wire = Wire {
            mode: self.mode,
            differential: self.differential,
            grace_time: self.grace_time,
            temperatures: self.anchors,
            timetable: self.schedule.clone(),
        };
        let json = serde_json::to_string_pretty(&wire)
            .map_err(|e| ThermodError::Transaction(e.to_string()))?;

        let tmp_path = tmp_path_for(&self.filepath);
        std::fs::write(&tmp_path, json).map_err(|source| ThermodError::Persistence { source })?;
        std::fs::rename(&tmp_path, &self.filepath)
            .map_err(|source| ThermodError::Persistence { source })?;
        Ok(())
    }

    fn bump_timestamp(&mut self) {
        self.last_update_timestamp = now_timestamp();
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub const fn anchors(&self) -> Anchors {
        self.anchors
    }

    #[must_use]
    pub const fn differential(&self) -> f64 {
        self.differential
    }

    #[must_use]
    pub const fn grace_time(&self) -> Option<f64> {
        self.grace_time
    }

    #[must_use]
    pub const fn last_update_timestamp(&self) -> f64 {
        self.last_update_timestamp
    }

    #[must_use]
    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// Mutate a single slot (spec.md §4.3 operation 4).
    pub fn update(
        &mut self,
        day: &str,
        hour: usize,
        quarter: usize,
        temperature: &str,
    ) -> Result<(), ThermodError> {
        let day = Day::parse(day).map_err(ThermodError::Validation)?;
        let temperature = Temperature::parse(temperature).map_err(ThermodError::Validation)?;

        let restore = self.snapshot();
        if let Err(e) = self.schedule.set_slot(day, hour, quarter, temperature) {
            self.restore(restore);
            return Err(ThermodError::Validation(e));
        }
        self.bump_timestamp();
        Ok(())
    }

    /// A single recognized POST option, applied through `apply_batch` so
    /// multiple fields in one request share one transaction (spec.md §4.6).
    pub fn apply_batch(&mut self, options: &[(String, String)]) -> Result<(), ThermodError> {
        let restore = self.snapshot();

        for (option, value) in options {
            if let Err(e) = self.apply_one(option, value) {
                self.restore(restore);
                return Err(ThermodError::Validation(e));
            }
        }

        if let Err(e) = self.validate() {
            self.restore(restore);
            return Err(ThermodError::Validation(e));
        }
        self.bump_timestamp();
        Ok(())
    }

    fn apply_one(&mut self, option: &str, value: &str) -> Result<(), String> {
        match option {
            "mode" => self.mode = Mode::parse(value)?,
            "t0" => self.anchors.t0 = parse_finite(value)?,
            "tmin" => self.anchors.tmin = parse_finite(value)?,
            "tmax" => self.anchors.tmax = parse_finite(value)?,
            "differential" => self.differential = parse_finite(value)?,
            "grace_time" => {
                self.grace_time = if value.eq_ignore_ascii_case("null") || value.is_empty() {
                    None
                } else {
                    Some(parse_finite(value)?)
                };
            }
            other => return Err(format!("unrecognized option `{other}`")),
        }
        Ok(())
    }

    /// Serialized snapshot suitable for the control surface's `settings`
    /// endpoint.
    #[must_use]
    pub fn settings(&self) -> serde_json::Value {
        let wire = Wire {
            mode: self.mode,
            differential: self.differential,
            grace_time: self.grace_time,
            temperatures: self.anchors,
            timetable: self.schedule.clone(),
        };
        serde_json::to_value(wire).unwrap_or(serde_json::Value::Null)
    }

    /// The scheduled target at a given wall-clock moment (spec.md §4.3
    /// operation 7). `now` defaults to `chrono::Local::now()` when `None`.
    #[must_use]
    pub fn target_temperature(&self, now: Option<chrono::DateTime<chrono::Local>>) -> f64 {
        use chrono::Timelike;

        let temperature_symbol = match self.mode {
            Mode::T0 => Temperature::T0,
            Mode::Tmin => Temperature::Tmin,
            Mode::Tmax => Temperature::Tmax,
            Mode::Auto | Mode::On | Mode::Off => {
                let now = now.unwrap_or_else(chrono::Local::now);
                let day = Day::from_chrono(now.weekday());
                let hour = now.hour() as usize;
                let quarter = (now.minute() / 15) as usize;
                self.schedule
                    .slot(day, hour, quarter)
                    .unwrap_or(Temperature::Degrees(self.anchors.t0))
            }
        };
        self.anchors.resolve(temperature_symbol)
    }

    /// The decision function from spec.md §4.3: turns
    /// `(mode, schedule, current temperature, actuator state, time)` into a
    /// boolean "should be active" output. `actuator_switch_off_time` bounds
    /// the grace time: once the equipment has been continuously on for
    /// `grace_time` seconds or more, this returns `false` even when
    /// hysteresis alone would call for staying on, forcing a contiguous-run
    /// overrun back off.
    #[must_use]
    pub fn should_be_active(
        &self,
        current_temperature: f64,
        actuator_is_on: bool,
        actuator_switch_off_time: SystemTime,
        now: Option<chrono::DateTime<chrono::Local>>,
    ) -> bool {
        match self.mode {
            Mode::Off => return false,
            Mode::On => return true,
            Mode::Auto | Mode::T0 | Mode::Tmin | Mode::Tmax => {}
        }

        let target = self.target_temperature(now);
        let half_diff = self.differential / 2.0;

        let hysteresis_active = match self.semantic {
            ActuatorSemantic::Heating => {
                if actuator_is_on {
                    current_temperature < target + half_diff
                } else {
                    current_temperature <= target - half_diff
                }
            }
            ActuatorSemantic::Cooling => {
                if actuator_is_on {
                    current_temperature > target - half_diff
                } else {
                    current_temperature >= target + half_diff
                }
            }
        };

        if !hysteresis_active {
            return false;
        }

        if actuator_is_on && grace_time_exceeded(self.grace_time, actuator_switch_off_time) {
            return false;
        }

        true
    }
}

fn parse_finite(value: &str) -> Result<f64, String> {
    let v: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("`{value}` is not finite"))
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".tmp");
    PathBuf::from(os_string)
}

/// Whether the equipment has been running long enough that it must be
/// forced off regardless of hysteresis (spec.md §4.3's grace-time
/// override: "if the actuator has been continuously on for ≥ grace_time
/// seconds, result is forced false"). `grace_time` of `None` means the
/// override never fires (∞). Tracking uses `switch_off_time()` and the
/// monotonic clock, per spec.md §4.3 — the actuator contract exposes no
/// separate "switched on at" timestamp, so the elapsed time since the
/// *previous* off transition stands in for how long the current on-run
/// has lasted, resetting on every transition (Open Question (a) in
/// spec.md §9).
fn grace_time_exceeded(grace_time: Option<f64>, switch_off_time: SystemTime) -> bool {
    match grace_time {
        Some(grace) => SystemTime::now()
            .duration_since(switch_off_time)
            .map(|elapsed| elapsed.as_secs_f64() >= grace)
            .unwrap_or(false),
        None => false,
    }
}

/// Serializable settings map used as the `(day, hour, quarter, temperature)`
/// JSON test fixture and by `surface::handlers` to build a minimal timetable
/// file on disk for integration tests.
#[must_use]
pub fn minimal_json(mode: Mode, anchors: Anchors, differential: f64) -> String {
    let wire = Wire {
        mode,
        differential,
        grace_time: None,
        temperatures: anchors,
        timetable: Schedule::uniform(Temperature::T0),
    };
    serde_json::to_string(&wire).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_anchors() -> Anchors {
        Anchors {
            t0: 10.0,
            tmin: 16.0,
            tmax: 21.0,
        }
    }

    #[test]
    fn mode_off_is_never_active() {
        let mut tt = Timetable::new("/tmp/does-not-matter.json");
        tt.load(&minimal_json(Mode::Off, sample_anchors(), 0.5))
            .expect("valid json");
        assert!(!tt.should_be_active(5.0, false, UNIX_EPOCH, None));
        assert!(!tt.should_be_active(50.0, true, UNIX_EPOCH, None));
    }

    #[test]
    fn mode_on_is_always_active() {
        let mut tt = Timetable::new("/tmp/does-not-matter.json");
        tt.load(&minimal_json(Mode::On, sample_anchors(), 0.5))
            .expect("valid json");
        assert!(tt.should_be_active(5.0, false, UNIX_EPOCH, None));
        assert!(tt.should_be_active(50.0, true, UNIX_EPOCH, None));
    }

    #[test]
    fn auto_below_target_with_anchor_symbol() {
        let mut tt = Timetable::new("/tmp/does-not-matter.json");
        tt.load(&minimal_json(Mode::Auto, sample_anchors(), 0.5))
            .expect("valid json");
        tt.update("monday", 3, 1, "tmax").expect("valid update");

        let now = chrono::Local
            .with_ymd_and_hms(2026, 7, 27, 3, 20, 0) // a Monday
            .single()
            .expect("valid local datetime");

        assert_eq!(tt.target_temperature(Some(now)), 21.0);
        assert!(tt.should_be_active(19.0, false, UNIX_EPOCH, Some(now)));
    }

    #[test]
    fn hysteresis_matches_actuator_state() {
        let mut tt = Timetable::new("/tmp/does-not-matter.json");
        tt.load(&minimal_json(Mode::Tmax, sample_anchors(), 0.5))
            .expect("valid json");

        // actuator off: active while current <= target - diff/2
        assert!(tt.should_be_active(20.74, false, UNIX_EPOCH, None));
        assert!(!tt.should_be_active(20.76, false, UNIX_EPOCH, None));

        // actuator on: active while current < target + diff/2
        assert!(tt.should_be_active(21.24, true, UNIX_EPOCH, None));
        assert!(!tt.should_be_active(21.26, true, UNIX_EPOCH, None));
    }

    #[test]
    fn grace_time_forces_off_after_a_long_contiguous_run() {
        let mut tt = Timetable::new("/tmp/does-not-matter.json");
        tt.load(&minimal_json(Mode::Tmax, sample_anchors(), 0.5))
            .expect("valid json");
        tt.apply_batch(&[("grace_time".to_string(), "60".to_string())])
            .expect("valid mutation");

        // Well below target: hysteresis alone would keep the actuator on,
        // but far more than grace_time seconds have elapsed since the last
        // switch-off, so the contiguous-run override forces it back off.
        let current = 20.0;
        assert!(!tt.should_be_active(current, true, UNIX_EPOCH, None));
    }

    #[test]
    fn grace_time_does_not_interfere_with_a_fresh_run() {
        let mut tt = Timetable::new("/tmp/does-not-matter.json");
        tt.load(&minimal_json(Mode::Tmax, sample_anchors(), 0.5))
            .expect("valid json");
        tt.apply_batch(&[("grace_time".to_string(), "60".to_string())])
            .expect("valid mutation");

        // The actuator only just switched off moments ago (i.e. this run
        // just started), so the grace window has not elapsed yet and
        // hysteresis alone governs the decision.
        let just_now = SystemTime::now();
        assert!(tt.should_be_active(20.0, true, just_now, None));
    }

    #[test]
    fn grace_time_of_none_never_forces_off() {
        let mut tt = Timetable::new("/tmp/does-not-matter.json");
        tt.load(&minimal_json(Mode::Tmax, sample_anchors(), 0.5))
            .expect("valid json");
        assert_eq!(tt.grace_time(), None);
        assert!(tt.should_be_active(20.0, true, UNIX_EPOCH, None));
    }

    #[test]
    fn round_trip_through_load_and_save() {
        let dir = std::env::temp_dir().join(format!("thermod-test-{:?}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("timetable.json");

        let mut tt = Timetable::new(&path);
        tt.load(&minimal_json(Mode::Auto, sample_anchors(), 0.3))
            .expect("valid json");
        tt.update("friday", 12, 2, "tmin").expect("valid update");
        tt.save().expect("save succeeds");

        let reloaded_blob = std::fs::read_to_string(&path).expect("read back");
        let mut reloaded = Timetable::new(&path);
        reloaded.load(&reloaded_blob).expect("reload succeeds");

        assert_eq!(reloaded.mode(), Mode::Auto);
        assert_eq!(
            reloaded
                .settings()
                .get("timetable")
                .and_then(|t| t.get("friday"))
                .and_then(|d| d.get("h12"))
                .and_then(serde_json::Value::as_array)
                .and_then(|a| a.get(2))
                .cloned(),
            Some(serde_json::Value::String("tmin".to_string()))
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn apply_batch_rolls_back_on_partial_failure() {
        let mut tt = Timetable::new("/tmp/does-not-matter.json");
        tt.load(&minimal_json(Mode::Auto, sample_anchors(), 0.5))
            .expect("valid json");
        let before = tt.anchors();

        let result = tt.apply_batch(&[
            ("tmax".to_string(), "32.3".to_string()),
            ("grace_time".to_string(), "not-a-number".to_string()),
        ]);

        assert!(result.is_err());
        assert_eq!(tt.anchors(), before);
    }

    #[test]
    fn last_update_timestamp_increases_on_accepted_mutation() {
        let mut tt = Timetable::new("/tmp/does-not-matter.json");
        tt.load(&minimal_json(Mode::Auto, sample_anchors(), 0.5))
            .expect("valid json");
        let first = tt.last_update_timestamp();

        std::thread::sleep(std::time::Duration::from_millis(2));
        tt.apply_batch(&[("mode".to_string(), "off".to_string())])
            .expect("valid mutation");

        assert!(tt.last_update_timestamp() > first);
    }
}
