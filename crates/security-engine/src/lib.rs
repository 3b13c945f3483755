//! Security engine for the smart-home controller
//!
//! Evaluates sensor readings against the home's security rules (arming,
//! intrusion, door and occupancy tracking) and drives the actuators:
//! buzzer, door light, RGB strip, LCD and the kitchen countdown display.

pub mod alarm;
pub mod config;
pub mod controls;
pub mod dispatcher;
pub mod display;
pub mod door;
pub mod engine;
pub mod error;
pub mod model;
pub mod occupancy;
pub mod outbox;
pub mod pin;
pub mod scheduler;
pub mod state;
pub mod timer;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use engine::HomeEngine;
pub use error::EngineError;
pub use model::*;
