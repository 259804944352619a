//! Fieldbus session.

use async_trait::async_trait;
use otsim_common::Measurement;
use rand::Rng;
use tracing::{info, warn};

use super::{Delivery, Lifecycle, MeasurementSink, SessionState, TransportOutcome, transmit_batch};
use crate::config::ModbusConfig;
use crate::encoding::{REGISTER_START, encode_registers, registers_to_bytes};
use crate::error::TransportError;
use crate::pacing::PacingPolicy;
use crate::transport::{FieldbusConnection, FieldbusConnector, TransportKind};

struct RegisterSink<'a> {
    connection: &'a mut dyn FieldbusConnection,
}

#[async_trait]
impl MeasurementSink for RegisterSink<'_> {
    async fn send(&mut self, measurement: &Measurement) -> Result<(), TransportError> {
        let registers = encode_registers(measurement)?;
        let bytes = registers_to_bytes(&registers);
        self.connection
            .write_registers(REGISTER_START, registers.len() as u16, &bytes)
            .await
    }
}

/// Connect to the server, write one batch of registers, disconnect.
pub async fn run<R: Rng + Send>(
    config: &ModbusConfig,
    connector: &dyn FieldbusConnector,
    rng: &mut R,
    pacing: &PacingPolicy,
) -> TransportOutcome {
    let kind = TransportKind::Modbus;
    let mut lifecycle = Lifecycle::new(kind);

    lifecycle.advance(SessionState::Connecting);
    let mut connection = match connector.connect(config).await {
        Ok(connection) => connection,
        Err(e) => return lifecycle.connect_failed(&config.address, config.port, e),
    };
    lifecycle.advance(SessionState::Connected);
    info!(address = %config.address, port = config.port, "Connected to Modbus server");

    lifecycle.advance(SessionState::Transmitting);
    let mut sink = RegisterSink {
        connection: connection.as_mut(),
    };
    let result = transmit_batch(&mut sink, kind, rng, pacing)
        .await
        .map(|devices| Delivery::Written { devices });

    lifecycle.advance(SessionState::Disconnecting);
    if let Err(e) = connection.disconnect().await {
        warn!(error = %e, "Modbus disconnect failed");
    }

    lifecycle.close(result)
}
