//! Wire-level types for the smart-home controller
//!
//! This crate defines the canonical sensor event shape, decodes inbound
//! sensor payloads, formats outbound actuator commands and declares the
//! transport and time-series traits the engine talks through.

pub mod adapter;
pub mod command;
pub mod event;
pub mod transport;
pub mod types;

pub use adapter::decode_payload;
pub use command::ActuatorCommand;
pub use event::{Scalar, SensorEvent, Value};
pub use transport::{BroadcastTransport, CommandTransport, Point, TimeSeriesSink};
pub use types::ProtocolError;
