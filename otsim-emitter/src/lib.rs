//! Synthetic OT telemetry emitter.
//!
//! Generates plausible readings for simulated industrial devices and sends
//! them over three transports:
//!
//! - **MQTT**: one JSON or CBOR message per device, QoS 0
//! - **Modbus TCP**: one holding-register write per device
//! - **CoAP**: observes a remote resource and counts notifications
//!
//! # Pass structure
//!
//! ```text
//! run_pass(selected)
//!   for each transport:  connect -> batch of 1..=10 devices -> disconnect
//!   report: one line per selected transport
//! ```
//!
//! Batches are generated fresh for every session, so two transports in the
//! same pass never share device ids.

pub mod config;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod http;
pub mod identity;
pub mod pacing;
pub mod session;
pub mod synthesizer;
pub mod transport;

pub use config::{ConfigError, EmitterConfig};
pub use dispatch::{Dispatcher, PassReport};
pub use error::{EncodeError, SessionError, TransportError};
pub use pacing::PacingPolicy;
pub use session::{Delivery, SessionState, TransportOutcome};
pub use transport::{TransportKind, Transports};
