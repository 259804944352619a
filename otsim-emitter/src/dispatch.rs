//! Dispatch coordinator.
//!
//! Runs one generation pass: every selected transport session in turn,
//! collecting one outcome per selected name.

use std::fmt;

use rand::Rng;
use tracing::info;

use crate::config::EmitterConfig;
use crate::pacing::PacingPolicy;
use crate::session::{self, TransportOutcome};
use crate::transport::{TransportKind, Transports};

/// Runs generation passes against a fixed set of transport collaborators.
///
/// The random source is the only state carried between passes.
pub struct Dispatcher<R> {
    transports: Transports,
    pacing: PacingPolicy,
    rng: R,
}

impl<R: Rng + Send> Dispatcher<R> {
    pub fn new(transports: Transports, pacing: PacingPolicy, rng: R) -> Self {
        Self {
            transports,
            pacing,
            rng,
        }
    }

    /// Run one pass over `selected`, in the order given.
    ///
    /// Sessions run one after another with a pause after each entry. Per-transport
    /// failures are captured in the report and never returned as errors.
    pub async fn run_pass<S: AsRef<str> + Sync>(
        &mut self,
        config: &EmitterConfig,
        selected: &[S],
    ) -> PassReport {
        let mut outcomes = Vec::with_capacity(selected.len());

        for name in selected {
            let outcome = match name.as_ref().parse::<TransportKind>() {
                Ok(kind) => {
                    info!(transport = %kind, "Starting session");
                    let outcome = self.run_session(kind, config).await;
                    info!(
                        transport = %kind,
                        state = %outcome.state(),
                        succeeded = outcome.succeeded(),
                        "Session finished"
                    );
                    outcome
                }
                Err(name) => {
                    info!(service = %name, "Skipping unknown service");
                    TransportOutcome::unknown(name)
                }
            };
            outcomes.push(outcome);

            // Every selected entry is followed by a gap, known or not
            self.pacing.transport_gap().await;
        }

        PassReport { outcomes }
    }

    async fn run_session(&mut self, kind: TransportKind, config: &EmitterConfig) -> TransportOutcome {
        match kind {
            TransportKind::Mqtt => {
                session::mqtt::run(
                    &config.mqtt,
                    self.transports.mqtt.as_ref(),
                    &mut self.rng,
                    &self.pacing,
                )
                .await
            }
            TransportKind::Modbus => {
                session::modbus::run(
                    &config.modbus,
                    self.transports.modbus.as_ref(),
                    &mut self.rng,
                    &self.pacing,
                )
                .await
            }
            TransportKind::Coap => {
                session::coap::run(&config.coap, self.transports.coap.as_ref()).await
            }
        }
    }
}

/// Outcomes of one pass, in selection order.
#[derive(Debug, Default)]
pub struct PassReport {
    outcomes: Vec<TransportOutcome>,
}

impl PassReport {
    pub fn outcomes(&self) -> &[TransportOutcome] {
        &self.outcomes
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Whether every selected transport succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(TransportOutcome::succeeded)
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.outcomes.is_empty() {
            return writeln!(f, "No services selected");
        }
        for outcome in &self.outcomes {
            writeln!(f, "{}", outcome.detail())?;
        }
        Ok(())
    }
}
