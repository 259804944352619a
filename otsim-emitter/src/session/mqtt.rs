//! Publish/subscribe session.

use async_trait::async_trait;
use otsim_common::{Format, Measurement};
use rand::Rng;
use tracing::{info, warn};

use super::{Delivery, Lifecycle, MeasurementSink, SessionState, TransportOutcome, transmit_batch};
use crate::config::MqttConfig;
use crate::encoding::{encode_pubsub, pubsub_topic};
use crate::error::TransportError;
use crate::pacing::PacingPolicy;
use crate::transport::{PubSubConnection, PubSubConnector, TransportKind};

struct PublishSink<'a> {
    connection: &'a mut dyn PubSubConnection,
    format: Format,
}

#[async_trait]
impl MeasurementSink for PublishSink<'_> {
    async fn send(&mut self, measurement: &Measurement) -> Result<(), TransportError> {
        let payload = encode_pubsub(measurement, self.format)?;
        self.connection
            .publish(&pubsub_topic(measurement), payload)
            .await
    }
}

/// Connect to the broker, publish one batch, disconnect.
pub async fn run<R: Rng + Send>(
    config: &MqttConfig,
    connector: &dyn PubSubConnector,
    rng: &mut R,
    pacing: &PacingPolicy,
) -> TransportOutcome {
    let kind = TransportKind::Mqtt;
    let mut lifecycle = Lifecycle::new(kind);

    lifecycle.advance(SessionState::Connecting);
    let mut connection = match connector.connect(config).await {
        Ok(connection) => connection,
        Err(e) => return lifecycle.connect_failed(&config.address, config.port, e),
    };
    lifecycle.advance(SessionState::Connected);
    info!(address = %config.address, port = config.port, "Connected to MQTT broker");

    lifecycle.advance(SessionState::Transmitting);
    let mut sink = PublishSink {
        connection: connection.as_mut(),
        format: config.format,
    };
    let result = transmit_batch(&mut sink, kind, rng, pacing)
        .await
        .map(|messages| Delivery::Published { messages });

    lifecycle.advance(SessionState::Disconnecting);
    if let Err(e) = connection.disconnect().await {
        warn!(error = %e, "MQTT disconnect failed");
    }

    lifecycle.close(result)
}
