//! Daemon configuration: a TOML file with environment-variable overrides,
//! following the same `find_config`/`load`/`apply_env` shape as the
//! teacher's lighting daemon, generalized to the thermostat's thermometer,
//! actuator and control-surface settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermometerKind {
    #[default]
    Script,
    OneWire,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThermometerSettings {
    pub kind: ThermometerKind,
    pub program: String,
    pub program_args: Vec<String>,
    /// One or more 1-Wire `w1_slave` device paths, comma-separated when
    /// more than one sensor feeds the same logical reading (spec.md
    /// §4.1's outlier policy).
    pub device_path: String,
    pub scale: String,
    /// Population standard deviation, in degrees, above which the
    /// one-wire/analog outlier policy warns and still returns the
    /// median/mean of the surviving sources (spec.md §4.1).
    pub outlier_max_stddev: f64,
    pub similarity_tolerance: Option<f64>,
    pub similarity_history_len: usize,
    pub averaging_window_seconds: Option<u64>,
    pub averaging_short_interval_seconds: u64,
    pub averaging_skipval: f64,
    /// Optional `(raw, reference)` calibration points, fitted by ordinary
    /// least squares (spec.md §4.1). Identity calibration when absent.
    pub calibration_points: Vec<[f64; 2]>,
}

impl Default for ThermometerSettings {
    fn default() -> Self {
        Self {
            kind: ThermometerKind::Script,
            program: "/usr/local/bin/thermod-thermometer".to_string(),
            program_args: Vec::new(),
            device_path: "/sys/bus/w1/devices/28-000000000000/w1_slave".to_string(),
            scale: "celsius".to_string(),
            outlier_max_stddev: 2.0,
            similarity_tolerance: None,
            similarity_history_len: 10,
            averaging_window_seconds: None,
            averaging_short_interval_seconds: 30,
            averaging_skipval: 0.3,
            calibration_points: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    #[default]
    Script,
    Gpio,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActuatorSettings {
    pub kind: ActuatorKind,
    pub switch_on_program: String,
    pub switch_off_program: String,
    pub status_program: String,
    pub gpio_pin: u8,
    pub gpio_active_high: bool,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            kind: ActuatorKind::Script,
            switch_on_program: "/usr/local/bin/thermod-switchon".to_string(),
            switch_off_program: "/usr/local/bin/thermod-switchoff".to_string(),
            status_program: "/usr/local/bin/thermod-status".to_string(),
            gpio_pin: 17,
            gpio_active_high: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlSurfaceSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ControlSurfaceSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4344,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub poll_interval_seconds: u64,
    pub timetable_file: String,
    pub pid_file: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            timetable_file: "~/.config/thermod/timetable.json".to_string(),
            pid_file: "/run/thermod.pid".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub thermometer: ThermometerSettings,
    pub actuator: ActuatorSettings,
    pub control_surface: ControlSurfaceSettings,
    pub daemon: DaemonSettings,
}

/// Search, in order, the usual places a `thermod.toml` might live:
/// a file in the current directory, then the user's config directory.
#[must_use]
pub fn find_config() -> Option<PathBuf> {
    let config_locations = [
        PathBuf::from("thermod.toml"),
        dirs::config_dir()?.join("thermod/config.toml"),
        dirs::config_dir()?.join("thermod.toml"),
    ];

    config_locations.into_iter().find(|path| path.exists())
}

/// Load settings from `path`, falling back to defaults on any read or
/// parse failure, then apply environment-variable overrides.
#[must_use]
pub fn load(path: Option<&str>) -> Settings {
    let mut settings: Settings = path.map_or_else(Settings::default, |p| {
        let content = std::fs::read_to_string(p).unwrap_or_default();
        toml::from_str(&content).unwrap_or_else(|e| {
            log::warn!("error parsing config: {e}");
            Settings::default()
        })
    });

    if settings.daemon.poll_interval_seconds == 0 {
        settings.daemon.poll_interval_seconds = 30;
    }

    apply_env(&mut settings);
    settings
}

/// Expand a leading `~` to the current user's home directory, the same
/// convention the timetable file and PID file paths use.
#[must_use]
pub fn expand_path(path: &str) -> PathBuf {
    path.strip_prefix("~/").map_or_else(
        || PathBuf::from(path),
        |rest| dirs::home_dir().map_or_else(|| PathBuf::from(path), |home| home.join(rest)),
    )
}

fn apply_env(settings: &mut Settings) {
    if let Ok(val) = std::env::var("THERMOD_TIMETABLE_FILE") {
        settings.daemon.timetable_file = val;
    }
    if let Ok(val) = std::env::var("THERMOD_POLL_INTERVAL") {
        if let Ok(interval) = val.parse() {
            settings.daemon.poll_interval_seconds = interval;
        }
    }
    if let Ok(val) = std::env::var("THERMOD_HOST") {
        settings.control_surface.host = val;
    }
    if let Ok(val) = std::env::var("THERMOD_PORT") {
        if let Ok(port) = val.parse() {
            settings.control_surface.port = port;
        }
    }
    if let Ok(val) = std::env::var("THERMOD_THERMOMETER_PROGRAM") {
        settings.thermometer.program = val;
    }
    if let Ok(val) = std::env::var("THERMOD_SWITCHON_PROGRAM") {
        settings.actuator.switch_on_program = val;
    }
    if let Ok(val) = std::env::var("THERMOD_SWITCHOFF_PROGRAM") {
        settings.actuator.switch_off_program = val;
    }
    if let Ok(val) = std::env::var("THERMOD_STATUS_PROGRAM") {
        settings.actuator.status_program = val;
    }
    if let Ok(val) = std::env::var("THERMOD_GPIO_PIN") {
        if let Ok(pin) = val.parse() {
            settings.actuator.gpio_pin = pin;
        }
    }
}
