//! Constrained-device session.
//!
//! Unlike the other sessions nothing is sent: the session observes a remote
//! resource for a bounded time and reports how many notifications arrived.
//! The registration response counts as the first notification.

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Delivery, Lifecycle, SessionState, TransportOutcome};
use crate::config::CoapConfig;
use crate::error::SessionError;
use crate::transport::{Notification, NotificationHandler, ObserveConnector, TransportKind};

/// Dial the server, observe the configured path, cancel, disconnect.
///
/// Registration and the notification wait share one `observe_timeout`
/// deadline. Receiving fewer notifications than `max_notifications` before it
/// is still a success. Only dial and registration errors fail the session.
pub async fn run(config: &CoapConfig, connector: &dyn ObserveConnector) -> TransportOutcome {
    let kind = TransportKind::Coap;
    let mut lifecycle = Lifecycle::new(kind);

    lifecycle.advance(SessionState::Connecting);
    let mut connection = match connector.dial(config).await {
        Ok(connection) => connection,
        Err(e) => return lifecycle.connect_failed(&config.address, config.port, e),
    };
    lifecycle.advance(SessionState::Connected);
    info!(address = %config.address, port = config.port, "Dialed CoAP server");

    lifecycle.advance(SessionState::Transmitting);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler: NotificationHandler = Box::new(move |notification| {
        // Receiver is gone once the wait is over
        let _ = tx.send(notification);
    });

    let deadline = Instant::now() + config.observe_timeout();
    let result = match connection.observe(&config.observe_path, handler).await {
        Ok(observation) => {
            let notifications =
                wait_for_notifications(&mut rx, config.max_notifications, deadline).await;

            if let Err(e) = connection.cancel(observation).await {
                warn!(path = %config.observe_path, error = %e, "Failed to cancel CoAP observation");
            }

            Ok(Delivery::Observed {
                path: config.observe_path.clone(),
                notifications,
            })
        }
        Err(source) => {
            warn!(path = %config.observe_path, error = %source, "CoAP observe failed");
            Err(SessionError::Observe {
                path: config.observe_path.clone(),
                address: config.address.clone(),
                port: config.port,
                source,
            })
        }
    };

    lifecycle.advance(SessionState::Disconnecting);
    if let Err(e) = connection.disconnect().await {
        warn!(error = %e, "CoAP disconnect failed");
    }

    lifecycle.close(result)
}

/// Count notifications until `max` arrive, the deadline passes, or the stream ends.
pub(crate) async fn wait_for_notifications(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
    max: usize,
    deadline: Instant,
) -> usize {
    let mut received = 0;

    while received < max {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(notification)) => {
                received += 1;
                debug!(
                    sequence = ?notification.sequence,
                    bytes = notification.payload.len(),
                    "CoAP notification"
                );
            }
            Ok(None) => break,
            Err(_) => {
                debug!(received, "CoAP observation timed out");
                break;
            }
        }
    }

    received
}
