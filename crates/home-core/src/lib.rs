//! Device state layer
//!
//! This crate keeps the latest reading per device, short rolling histories
//! for direction heuristics, the per-device configuration, and a file-backed
//! time-series sink.

pub mod device;
pub mod history;
pub mod persistence;
pub mod store;

pub use device::{DeviceConfig, DeviceRecord, Pull};
pub use history::HistoryBuffer;
pub use persistence::{FileSeriesSink, SinkError};
pub use store::DeviceStore;
