//! A programmable thermostat daemon: a weekly schedule drives a hysteresis
//! control loop, which reads a thermometer and drives an actuator, while an
//! HTTP control surface lets other processes inspect and change the
//! schedule at runtime.

pub mod actuator;
pub mod control_loop;
pub mod coordinator;
pub mod daemon_config;
pub mod error;
pub mod status;
pub mod surface;
pub mod thermometer;
pub mod timetable;
