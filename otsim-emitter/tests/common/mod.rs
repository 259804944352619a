//! In-memory transport collaborators for tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use otsim_emitter::config::{CoapConfig, ModbusConfig, MqttConfig};
use otsim_emitter::transport::{
    FieldbusConnection, FieldbusConnector, Notification, NotificationHandler, ObserveConnection,
    ObserveConnector, Observation, PubSubConnection, PubSubConnector, Transports,
};
use otsim_emitter::{EmitterConfig, TransportError};

pub const CONFIG: &str = r#"{
    mqtt: { address: "127.0.0.1", port: 1883 },
    modbus: { address: "127.0.0.1", port: 502 },
    coap: { address: "127.0.0.1", port: 5683 },
    web: { address: "127.0.0.1", port: 8080 },
}"#;

pub fn config() -> EmitterConfig {
    EmitterConfig::parse(CONFIG).unwrap()
}

/// Every call made against the fakes, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect(&'static str),
    Publish { topic: String, payload: Vec<u8> },
    Write { start: u16, count: u16, bytes: Vec<u8> },
    Observe(String),
    Cancel(String),
    Disconnect(&'static str),
}

pub type Journal = Arc<Mutex<Vec<Call>>>;

fn record(journal: &Journal, call: Call) {
    journal.lock().unwrap().push(call);
}

fn refused() -> TransportError {
    TransportError::Connect("Connection refused".to_string())
}

// -----------------------------------------------------------------------------
// Publish/subscribe
// -----------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeBroker {
    pub journal: Journal,
    pub refuse: bool,
    /// Publish number (1-based) that fails.
    pub fail_publish: Option<usize>,
}

struct FakeBrokerConnection {
    journal: Journal,
    fail_publish: Option<usize>,
    published: usize,
}

#[async_trait]
impl PubSubConnector for FakeBroker {
    async fn connect(&self, _config: &MqttConfig) -> Result<Box<dyn PubSubConnection>, TransportError> {
        record(&self.journal, Call::Connect("mqtt"));
        if self.refuse {
            return Err(refused());
        }
        Ok(Box::new(FakeBrokerConnection {
            journal: self.journal.clone(),
            fail_publish: self.fail_publish,
            published: 0,
        }))
    }
}

#[async_trait]
impl PubSubConnection for FakeBrokerConnection {
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.published += 1;
        if self.fail_publish == Some(self.published) {
            return Err(TransportError::Closed);
        }
        record(
            &self.journal,
            Call::Publish {
                topic: topic.to_string(),
                payload,
            },
        );
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), TransportError> {
        record(&self.journal, Call::Disconnect("mqtt"));
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Fieldbus
// -----------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeFieldbus {
    pub journal: Journal,
    pub refuse: bool,
    /// Write number (1-based) that fails.
    pub fail_write: Option<usize>,
}

struct FakeFieldbusConnection {
    journal: Journal,
    fail_write: Option<usize>,
    written: usize,
}

#[async_trait]
impl FieldbusConnector for FakeFieldbus {
    async fn connect(
        &self,
        _config: &ModbusConfig,
    ) -> Result<Box<dyn FieldbusConnection>, TransportError> {
        record(&self.journal, Call::Connect("modbus"));
        if self.refuse {
            return Err(refused());
        }
        Ok(Box::new(FakeFieldbusConnection {
            journal: self.journal.clone(),
            fail_write: self.fail_write,
            written: 0,
        }))
    }
}

#[async_trait]
impl FieldbusConnection for FakeFieldbusConnection {
    async fn write_registers(
        &mut self,
        start: u16,
        count: u16,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        self.written += 1;
        if self.fail_write == Some(self.written) {
            return Err(TransportError::Io("broken pipe".to_string()));
        }
        record(
            &self.journal,
            Call::Write {
                start,
                count,
                bytes: bytes.to_vec(),
            },
        );
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), TransportError> {
        record(&self.journal, Call::Disconnect("modbus"));
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Constrained-device observe
// -----------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeObserveServer {
    pub journal: Journal,
    pub refuse: bool,
    pub reject_observe: bool,
    /// Notifications delivered immediately after registration.
    pub notifications: usize,
}

struct FakeObserveConnection {
    journal: Journal,
    reject_observe: bool,
    notifications: usize,
    handler: Option<NotificationHandler>,
}

#[async_trait]
impl ObserveConnector for FakeObserveServer {
    async fn dial(&self, _config: &CoapConfig) -> Result<Box<dyn ObserveConnection>, TransportError> {
        record(&self.journal, Call::Connect("coap"));
        if self.refuse {
            return Err(refused());
        }
        Ok(Box::new(FakeObserveConnection {
            journal: self.journal.clone(),
            reject_observe: self.reject_observe,
            notifications: self.notifications,
            handler: None,
        }))
    }
}

#[async_trait]
impl ObserveConnection for FakeObserveConnection {
    async fn observe(
        &mut self,
        path: &str,
        mut handler: NotificationHandler,
    ) -> Result<Observation, TransportError> {
        record(&self.journal, Call::Observe(path.to_string()));
        if self.reject_observe {
            return Err(TransportError::Protocol("4.04 Not Found".to_string()));
        }
        for sequence in 0..self.notifications {
            handler(Notification {
                sequence: Some(sequence as u32),
                payload: b"21.5".to_vec(),
            });
        }
        // Keep the handler alive so the stream stays open until cancel.
        self.handler = Some(handler);
        Ok(Observation {
            path: path.to_string(),
            token: vec![1, 2, 3, 4],
        })
    }

    async fn cancel(&mut self, observation: Observation) -> Result<(), TransportError> {
        self.handler = None;
        record(&self.journal, Call::Cancel(observation.path));
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), TransportError> {
        record(&self.journal, Call::Disconnect("coap"));
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Bundle
// -----------------------------------------------------------------------------

pub struct Fakes {
    pub journal: Journal,
    pub broker: FakeBroker,
    pub fieldbus: FakeFieldbus,
    pub observe: FakeObserveServer,
}

impl Fakes {
    /// Healthy fakes sharing one journal.
    pub fn new() -> Self {
        let journal = Journal::default();
        Self {
            broker: FakeBroker {
                journal: journal.clone(),
                ..Default::default()
            },
            fieldbus: FakeFieldbus {
                journal: journal.clone(),
                ..Default::default()
            },
            observe: FakeObserveServer {
                journal: journal.clone(),
                notifications: 3,
                ..Default::default()
            },
            journal,
        }
    }

    pub fn transports(&self) -> Transports {
        Transports {
            mqtt: Arc::new(self.broker.clone()),
            modbus: Arc::new(self.fieldbus.clone()),
            coap: Arc::new(self.observe.clone()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.journal.lock().unwrap().clone()
    }
}
