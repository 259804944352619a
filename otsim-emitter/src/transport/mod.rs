//! Transport collaborators.
//!
//! Sessions talk to the outside world only through the traits in this module.
//! Production implementations wrap real protocol clients:
//!
//! - [`mqtt::RumqttConnector`] - publish/subscribe over MQTT (`rumqttc`)
//! - [`modbus::TokioModbusConnector`] - Modbus TCP register writes (`tokio-modbus`)
//! - [`coap::UdpCoapConnector`] - CoAP observe over UDP (`coap-lite`)

pub mod coap;
pub mod modbus;
pub mod mqtt;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{CoapConfig, ModbusConfig, MqttConfig};
use crate::error::TransportError;

/// The outbound protocol integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Mqtt,
    Modbus,
    Coap,
}

impl TransportKind {
    pub const ALL: [TransportKind; 3] =
        [TransportKind::Mqtt, TransportKind::Modbus, TransportKind::Coap];

    /// Service name used for selection.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Mqtt => "mqtt",
            TransportKind::Modbus => "modbus",
            TransportKind::Coap => "coap",
        }
    }

    /// Human-readable protocol name.
    pub fn display_name(&self) -> &'static str {
        match self {
            TransportKind::Mqtt => "MQTT",
            TransportKind::Modbus => "Modbus",
            TransportKind::Coap => "CoAP",
        }
    }

    /// What the remote endpoint is called for this protocol.
    pub fn peer_role(&self) -> &'static str {
        match self {
            TransportKind::Mqtt => "broker",
            TransportKind::Modbus | TransportKind::Coap => "server",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransportKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

// =============================================================================
// Publish/subscribe
// =============================================================================

/// Opens publish/subscribe connections.
#[async_trait]
pub trait PubSubConnector: Send + Sync {
    async fn connect(&self, config: &MqttConfig) -> Result<Box<dyn PubSubConnection>, TransportError>;
}

/// An open publish/subscribe connection.
#[async_trait]
pub trait PubSubConnection: Send {
    /// Publish one payload on `topic`.
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Release the connection.
    async fn disconnect(self: Box<Self>) -> Result<(), TransportError>;
}

// =============================================================================
// Fieldbus
// =============================================================================

/// Opens fieldbus connections.
#[async_trait]
pub trait FieldbusConnector: Send + Sync {
    async fn connect(
        &self,
        config: &ModbusConfig,
    ) -> Result<Box<dyn FieldbusConnection>, TransportError>;
}

/// An open fieldbus connection.
#[async_trait]
pub trait FieldbusConnection: Send {
    /// Write `count` registers starting at `start`, given as big-endian bytes.
    async fn write_registers(
        &mut self,
        start: u16,
        count: u16,
        bytes: &[u8],
    ) -> Result<(), TransportError>;

    /// Release the connection.
    async fn disconnect(self: Box<Self>) -> Result<(), TransportError>;
}

// =============================================================================
// Constrained-device observe
// =============================================================================

/// A notification delivered for an observed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Observe sequence number, when the server sent one.
    pub sequence: Option<u32>,
    pub payload: Vec<u8>,
}

/// Callback invoked for every notification of an observation.
pub type NotificationHandler = Box<dyn FnMut(Notification) + Send + 'static>;

/// Handle identifying a registered observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub path: String,
    pub token: Vec<u8>,
}

/// Dials constrained-device endpoints.
#[async_trait]
pub trait ObserveConnector: Send + Sync {
    async fn dial(&self, config: &CoapConfig) -> Result<Box<dyn ObserveConnection>, TransportError>;
}

/// An open constrained-device connection.
#[async_trait]
pub trait ObserveConnection: Send {
    /// Register an observation of `path`; `handler` runs for each notification.
    async fn observe(
        &mut self,
        path: &str,
        handler: NotificationHandler,
    ) -> Result<Observation, TransportError>;

    /// Cancel a registered observation.
    async fn cancel(&mut self, observation: Observation) -> Result<(), TransportError>;

    /// Release the connection.
    async fn disconnect(self: Box<Self>) -> Result<(), TransportError>;
}

/// Resolve a host/port pair to the first socket address.
pub(crate) async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TransportError::Connect(format!("Invalid address: {}", e)))?
        .next()
        .ok_or_else(|| TransportError::Connect(format!("No address found for {}", host)))
}

// =============================================================================
// Bundle
// =============================================================================

/// The set of collaborators a dispatcher runs sessions against.
#[derive(Clone)]
pub struct Transports {
    pub mqtt: Arc<dyn PubSubConnector>,
    pub modbus: Arc<dyn FieldbusConnector>,
    pub coap: Arc<dyn ObserveConnector>,
}

impl Transports {
    /// Real network clients.
    pub fn production() -> Self {
        Self {
            mqtt: Arc::new(mqtt::RumqttConnector),
            modbus: Arc::new(modbus::TokioModbusConnector),
            coap: Arc::new(coap::UdpCoapConnector),
        }
    }
}
