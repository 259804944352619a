//! Pacing between transmissions.
//!
//! Messages within a batch and sessions within a pass are spaced out to bound
//! the burst load placed on target systems. Tests swap in [`PacingPolicy::none`].

use std::time::Duration;

/// Default gap between two messages of one batch.
pub const MESSAGE_INTERVAL: Duration = Duration::from_millis(500);

/// Default gap after each transport session of a pass.
pub const TRANSPORT_INTERVAL: Duration = Duration::from_millis(500);

/// How long to wait between transmissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub between_messages: Duration,
    pub between_transports: Duration,
}

impl PacingPolicy {
    /// Realistic device cadence.
    pub const fn standard() -> Self {
        Self {
            between_messages: MESSAGE_INTERVAL,
            between_transports: TRANSPORT_INTERVAL,
        }
    }

    /// No waiting at all.
    pub const fn none() -> Self {
        Self {
            between_messages: Duration::ZERO,
            between_transports: Duration::ZERO,
        }
    }

    /// Wait before the next message of a batch.
    pub async fn message_gap(&self) {
        pause(self.between_messages).await;
    }

    /// Wait after a transport session completes.
    pub async fn transport_gap(&self) {
        pause(self.between_transports).await;
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
