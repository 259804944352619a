//! Transport sessions.
//!
//! A session runs once per pass against one endpoint:
//!
//! ```text
//! Idle -> Connecting -> Connected -> Transmitting -> Disconnecting -> Closed
//!                   \-> ConnectFailed
//! ```
//!
//! Whatever happens, a session produces exactly one [`TransportOutcome`] and
//! never returns an error to its caller. Once connected, the connection is
//! always released, including after a failed transmission.

pub mod coap;
pub mod modbus;
pub mod mqtt;

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use otsim_common::Measurement;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{SessionError, TransportError};
use crate::identity::allocate_batch_plan;
use crate::pacing::PacingPolicy;
use crate::synthesizer::synthesize;
use crate::transport::TransportKind;

/// Lifecycle state of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Transmitting,
    Disconnecting,
    Closed,
    ConnectFailed,
}

impl SessionState {
    /// Whether the session has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::ConnectFailed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Transmitting => "transmitting",
            Self::Disconnecting => "disconnecting",
            Self::Closed => "closed",
            Self::ConnectFailed => "connect-failed",
        };
        write!(f, "{}", s)
    }
}

/// What a successful session delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Published { messages: usize },
    Written { devices: usize },
    Observed { path: String, notifications: usize },
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Published { messages } => {
                write!(f, "Sending OT MQTT data ({} messages)", messages)
            }
            Delivery::Written { devices } => {
                write!(f, "Sending OT Modbus data ({} devices)", devices)
            }
            Delivery::Observed {
                path,
                notifications,
            } => write!(f, "Observed {} CoAP notifications on {}", notifications, path),
        }
    }
}

/// Result of one session run. Immutable once created.
#[derive(Debug)]
pub struct TransportOutcome {
    transport: String,
    state: SessionState,
    result: Result<Delivery, SessionError>,
}

impl TransportOutcome {
    pub(crate) fn new(
        transport: TransportKind,
        state: SessionState,
        result: Result<Delivery, SessionError>,
    ) -> Self {
        Self {
            transport: transport.as_str().to_string(),
            state,
            result,
        }
    }

    /// Outcome for a name that matches no transport. No session ran.
    pub fn unknown(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            transport: name.clone(),
            state: SessionState::Idle,
            result: Err(SessionError::UnknownTransport { name }),
        }
    }

    /// Selected transport name.
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// Terminal lifecycle state reached.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn delivery(&self) -> Option<&Delivery> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.result.as_ref().err()
    }

    /// Human-readable one-line summary.
    pub fn detail(&self) -> String {
        match &self.result {
            Ok(delivery) => delivery.to_string(),
            Err(error) => error.to_string(),
        }
    }
}

impl fmt::Display for TransportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detail())
    }
}

/// Tracks and logs the state transitions of one session.
pub(crate) struct Lifecycle {
    transport: TransportKind,
    state: SessionState,
}

impl Lifecycle {
    pub(crate) fn new(transport: TransportKind) -> Self {
        Self {
            transport,
            state: SessionState::Idle,
        }
    }

    pub(crate) fn advance(&mut self, next: SessionState) {
        debug!(
            transport = %self.transport,
            from = %self.state,
            to = %next,
            "Session state change"
        );
        self.state = next;
    }

    /// Record a failed connect and build the outcome.
    pub(crate) fn connect_failed(
        mut self,
        address: &str,
        port: u16,
        source: TransportError,
    ) -> TransportOutcome {
        warn!(
            transport = %self.transport,
            address,
            port,
            error = %source,
            "Connect failed"
        );
        self.advance(SessionState::ConnectFailed);

        TransportOutcome::new(
            self.transport,
            self.state,
            Err(SessionError::Connect {
                transport: self.transport,
                address: address.to_string(),
                port,
                source,
            }),
        )
    }

    /// Move to `Closed` and build the outcome.
    pub(crate) fn close(mut self, result: Result<Delivery, SessionError>) -> TransportOutcome {
        self.advance(SessionState::Closed);
        TransportOutcome::new(self.transport, self.state, result)
    }
}

/// Sends one measurement over an open connection.
#[async_trait]
pub(crate) trait MeasurementSink: Send {
    async fn send(&mut self, measurement: &Measurement) -> Result<(), TransportError>;
}

/// Generate a fresh batch and send it through `sink`, one device at a time.
///
/// Stops at the first failed device. Returns the number of devices sent.
pub(crate) async fn transmit_batch<R: Rng + Send>(
    sink: &mut dyn MeasurementSink,
    transport: TransportKind,
    rng: &mut R,
    pacing: &PacingPolicy,
) -> Result<usize, SessionError> {
    let plan = allocate_batch_plan(rng);
    debug!(transport = %transport, devices = plan.count(), "Generated batch");

    for (index, (device_id, archetype)) in plan.devices().enumerate() {
        if index > 0 {
            pacing.message_gap().await;
        }

        let measurement = synthesize(rng, device_id, archetype, Utc::now());

        if let Err(source) = sink.send(&measurement).await {
            warn!(
                transport = %transport,
                device_id = measurement.device_id(),
                error = %source,
                "Transmit failed, skipping rest of batch"
            );
            return Err(SessionError::Transmit {
                transport,
                device_id: measurement.device_id().to_string(),
                source,
            });
        }

        debug!(
            transport = %transport,
            device_id = measurement.device_id(),
            status = %measurement.status(),
            "Sent measurement"
        );
    }

    Ok(plan.count())
}
