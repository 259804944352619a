//! MQTT publisher built on `rumqttc`.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{PubSubConnection, PubSubConnector};
use crate::config::MqttConfig;
use crate::error::TransportError;

const KEEP_ALIVE: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 16;
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// Connects to an MQTT broker and publishes at QoS 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct RumqttConnector;

#[async_trait]
impl PubSubConnector for RumqttConnector {
    async fn connect(
        &self,
        config: &MqttConfig,
    ) -> Result<Box<dyn PubSubConnection>, TransportError> {
        let mut options = MqttOptions::new(&config.client_id, &config.address, config.port);
        options.set_keep_alive(KEEP_ALIVE);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let timeout = config.connect_timeout();
        tokio::time::timeout(timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        debug!(address = %config.address, port = config.port, "MQTT broker accepted connection");

        let driver = tokio::spawn(drive_event_loop(eventloop));
        Ok(Box::new(RumqttConnection { client, driver }))
    }
}

/// Poll the event loop until the broker answers the CONNECT.
async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), TransportError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(TransportError::Connect(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(TransportError::Connect(e.to_string())),
        }
    }
}

/// Keep the connection serviced until it is closed or fails.
async fn drive_event_loop(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(event) => trace!(?event, "MQTT event"),
            Err(e) => {
                debug!(error = %e, "MQTT event loop stopped");
                break;
            }
        }
    }
}

struct RumqttConnection {
    client: AsyncClient,
    driver: JoinHandle<()>,
}

#[async_trait]
impl PubSubConnection for RumqttConnection {
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.driver.is_finished() {
            return Err(TransportError::Closed);
        }

        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }

    async fn disconnect(self: Box<Self>) -> Result<(), TransportError> {
        let RumqttConnection { client, mut driver } = *self;

        let result = client
            .disconnect()
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()));

        // Let queued publishes flush before the loop is torn down
        if tokio::time::timeout(DISCONNECT_GRACE, &mut driver)
            .await
            .is_err()
        {
            warn!("MQTT event loop did not stop in time, aborting");
            driver.abort();
        }

        result
    }
}
