//! Error types for transports and sessions.

use thiserror::Error;

use crate::transport::TransportKind;

/// Failure raised by a transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failure converting a measurement to its wire representation.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A scaled reading does not fit in a 16-bit register.
    #[error("{field} value {value} does not fit in a 16-bit register")]
    RegisterOverflow { field: &'static str, value: f64 },

    #[error("payload encoding failed: {0}")]
    Payload(#[from] otsim_common::Error),
}

/// Why a transport session did not complete successfully.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session could not connect to its endpoint.
    #[error(
        "Failed to connect to {} {} on {address}:{port}: {source}",
        .transport.display_name(),
        .transport.peer_role()
    )]
    Connect {
        transport: TransportKind,
        address: String,
        port: u16,
        source: TransportError,
    },

    /// Sending one device's data failed; the rest of the batch was skipped.
    #[error(
        "Failed to write data to {} for device {device_id}: {source}",
        .transport.display_name()
    )]
    Transmit {
        transport: TransportKind,
        device_id: String,
        source: TransportError,
    },

    /// Registering the observation failed.
    #[error("Failed to observe {path} on CoAP server {address}:{port}: {source}")]
    Observe {
        path: String,
        address: String,
        port: u16,
        source: TransportError,
    },

    /// The selected transport name is not known.
    #[error("unknown service: {name}")]
    UnknownTransport { name: String },
}

impl SessionError {
    /// Identifier of the device whose data could not be sent, if any.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            SessionError::Transmit { device_id, .. } => Some(device_id),
            _ => None,
        }
    }
}
