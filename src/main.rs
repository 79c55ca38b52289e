#![allow(clippy::print_stdout, reason = "CLI binary produces user-facing output")]
#![allow(clippy::print_stderr, reason = "CLI binary reports errors to stderr")]
#![allow(clippy::exit, reason = "CLI binary uses process::exit for daemon exit codes")]

use clap::{Parser, Subcommand};
use std::process;
use std::thread;
use std::time::Duration;
use thermod::actuator::variants::ScriptActuator;
use thermod::actuator::Actuator;
use thermod::control_loop::{ControlLoop, ShutdownFlag};
use thermod::coordinator::Coordinator;
use thermod::daemon_config::{self, ActuatorKind, Settings, ThermometerKind};
use thermod::error::ExitCode;
use thermod::status::{StatusBus, ThermodStatus};
use thermod::surface::{self, handlers::AppState};
use thermod::thermometer::calibration::Calibration;
use thermod::thermometer::decorators::{AveragingWindow, ScaleAdapter, SimilarityChecker};
use thermod::thermometer::variants::{OneWireThermometer, ScriptThermometer};
use thermod::thermometer::{Scale, Thermometer};
use thermod::timetable::Timetable;

#[derive(Parser, Debug)]
#[command(name = "thermod")]
#[command(author = "thermod developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Programmable thermostat daemon", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long, global = true)]
    config: Option<String>,

    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon: control loop plus HTTP control surface.
    Daemon,
    /// Print the current status as reported by the control loop's status
    /// file, without starting anything.
    Status,
    /// Validate the configuration and timetable files, then exit.
    CheckConfig,
}

fn exit_with(code: ExitCode) -> ! {
    process::exit(code.code());
}

fn load_timetable(settings: &Settings) -> Timetable {
    let path = daemon_config::expand_path(&settings.daemon.timetable_file);
    let mut timetable = Timetable::new(path.clone());
    match std::fs::read_to_string(&path) {
        Ok(blob) => {
            if let Err(e) = timetable.load(&blob) {
                eprintln!("invalid timetable file {}: {e}", path.display());
                exit_with(ExitCode::TimetableInvalid);
            }
        }
        Err(e) => {
            eprintln!("cannot read timetable file {}: {e}", path.display());
            exit_with(ExitCode::TimetableMissing);
        }
    }
    timetable
}

fn parse_scale(scale: &str) -> Scale {
    if scale.eq_ignore_ascii_case("fahrenheit") {
        Scale::Fahrenheit
    } else {
        Scale::Celsius
    }
}

fn calibration_for(settings: &Settings) -> Calibration {
    let points: Vec<(f64, f64)> = settings
        .thermometer
        .calibration_points
        .iter()
        .map(|[raw, reference]| (*raw, *reference))
        .collect();
    Calibration::fit(&points).unwrap_or_else(Calibration::identity)
}

/// Builds the raw sensor variant the configuration's `kind` selects, then
/// wraps it in the outer-to-inner decorator order from spec.md §4.1:
/// averaging -> similarity check -> scale adapter -> raw sensor.
fn build_thermometer(settings: &Settings) -> Box<dyn Thermometer> {
    let raw: Box<dyn Thermometer> = match settings.thermometer.kind {
        ThermometerKind::Script => Box::new(ScriptThermometer::new(
            settings.thermometer.program.clone(),
            settings.thermometer.program_args.clone(),
        )),
        ThermometerKind::OneWire => {
            let device_paths = settings
                .thermometer
                .device_path
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(std::path::PathBuf::from)
                .collect();
            Box::new(OneWireThermometer::new(
                device_paths,
                settings.thermometer.outlier_max_stddev,
            ))
        }
    };

    let scaled: Box<dyn Thermometer> = Box::new(ScaleAdapter::new(
        raw,
        parse_scale(&settings.thermometer.scale),
        calibration_for(settings),
    ));

    let checked: Box<dyn Thermometer> = match settings.thermometer.similarity_tolerance {
        Some(delta) => Box::new(SimilarityChecker::new(
            scaled,
            settings.thermometer.similarity_history_len,
            delta,
        )),
        None => scaled,
    };

    match settings.thermometer.averaging_window_seconds {
        Some(averaging_seconds) => {
            let short_interval = settings.thermometer.averaging_short_interval_seconds.max(1);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "averaging window sizes fit comfortably in usize"
            )]
            let capacity = (averaging_seconds / short_interval).max(1) as usize;
            Box::new(AveragingWindow::new(
                checked,
                capacity,
                settings.thermometer.averaging_skipval,
            ))
        }
        None => checked,
    }
}

fn build_actuator(settings: &Settings) -> Box<dyn Actuator> {
    match settings.actuator.kind {
        ActuatorKind::Script => Box::new(ScriptActuator::new(
            settings.actuator.switch_on_program.clone().into(),
            settings.actuator.switch_off_program.clone().into(),
            settings.actuator.status_program.clone().into(),
        )),
        ActuatorKind::Gpio => build_gpio_actuator(settings),
    }
}

#[cfg(feature = "gpio")]
fn build_gpio_actuator(settings: &Settings) -> Box<dyn Actuator> {
    match thermod::actuator::variants::GpioActuator::new(
        settings.actuator.gpio_pin,
        settings.actuator.gpio_active_high,
    ) {
        Ok(actuator) => Box::new(actuator),
        Err(e) => {
            eprintln!("failed to initialize GPIO actuator: {e}");
            exit_with(ExitCode::ActuatorInit);
        }
    }
}

#[cfg(not(feature = "gpio"))]
fn build_gpio_actuator(_settings: &Settings) -> Box<dyn Actuator> {
    eprintln!("actuator.kind = \"gpio\" requires building with the `gpio` feature enabled");
    exit_with(ExitCode::ActuatorInit);
}

fn run_daemon(settings: &Settings) -> ExitCode {
    let timetable = load_timetable(settings);
    let initial_mode = timetable.mode();
    let coordinator = Coordinator::new(timetable);

    let status_bus = StatusBus::new(ThermodStatus::ok(None, 0.0, false, initial_mode, 0.0));

    let shutdown = ShutdownFlag::new();
    let shutdown_for_signal = shutdown.clone();
    let coordinator_for_signal = coordinator.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        shutdown_for_signal.trigger();
        coordinator_for_signal.notify();
    }) {
        log::warn!("failed to install signal handler: {e}");
    }

    let control_loop = ControlLoop::new(
        coordinator.clone(),
        build_thermometer(settings),
        build_actuator(settings),
        status_bus.clone(),
        Duration::from_secs(settings.daemon.poll_interval_seconds),
        shutdown.clone(),
    );

    let loop_handle = thread::spawn(move || control_loop.run());

    let app_state = AppState {
        coordinator,
        status_bus,
    };
    let bind_address = format!(
        "{}:{}",
        settings.control_surface.host, settings.control_surface.port
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            exit_with(ExitCode::SocketInit);
        }
    };

    let surface_result = runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        log::info!("control surface listening on {bind_address}");
        axum::serve(listener, surface::router(app_state))
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.is_triggered() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            })
            .await
    });

    if let Err(e) = surface_result {
        eprintln!("control surface error: {e}");
    }

    match loop_handle.join() {
        Ok(thermod::control_loop::StopReason::Requested) => ExitCode::Ok,
        Ok(thermod::control_loop::StopReason::SensorFailure) => ExitCode::RuntimeSensor,
        Ok(thermod::control_loop::StopReason::ActuatorFailure) => ExitCode::RuntimeActuator,
        Err(_) => ExitCode::ShutdownActuator,
    }
}

fn check_config(settings: &Settings) -> ExitCode {
    let timetable = load_timetable(settings);
    println!("timetable OK, mode={}", timetable.mode().as_str());
    println!(
        "control surface will listen on {}:{}",
        settings.control_surface.host, settings.control_surface.port
    );
    ExitCode::Ok
}

fn print_status(settings: &Settings) -> ExitCode {
    let timetable = load_timetable(settings);
    let target = timetable.target_temperature(None);
    println!("mode={}", timetable.mode().as_str());
    println!("target_temperature={target:.2}");
    ExitCode::Ok
}

fn main() {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config_path = args
        .config
        .clone()
        .or_else(|| daemon_config::find_config().map(|p| p.to_string_lossy().into_owned()));
    let settings = daemon_config::load(config_path.as_deref());

    let exit_code = match args.command {
        Some(Commands::Daemon) | None => run_daemon(&settings),
        Some(Commands::Status) => print_status(&settings),
        Some(Commands::CheckConfig) => check_config(&settings),
    };

    exit_with(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scale_defaults_to_celsius() {
        assert_eq!(parse_scale("celsius"), Scale::Celsius);
        assert_eq!(parse_scale("bogus"), Scale::Celsius);
        assert_eq!(parse_scale("Fahrenheit"), Scale::Fahrenheit);
    }

    #[test]
    fn calibration_for_is_identity_without_configured_points() {
        let settings = Settings::default();
        let calibration = calibration_for(&settings);
        assert!((calibration.apply(20.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn calibration_for_fits_configured_points() {
        let mut settings = Settings::default();
        settings.thermometer.calibration_points =
            vec![[0.0, 1.0], [1.0, 3.0], [2.0, 5.0], [3.0, 7.0]];
        let calibration = calibration_for(&settings);
        assert!((calibration.apply(0.0) - 1.0).abs() < 1e-6);
        assert!((calibration.apply(3.0) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn build_thermometer_selects_one_wire_variant_from_kind() {
        let mut settings = Settings::default();
        settings.thermometer.kind = ThermometerKind::OneWire;
        settings.thermometer.device_path =
            "/nonexistent/device/a, /nonexistent/device/b".to_string();
        // Both devices are unreadable, so the sensor must surface a
        // read failure rather than panicking on the empty reading set.
        let mut thermometer = build_thermometer(&settings);
        assert!(thermometer.temperature().is_err());
    }
}
