//! Modbus TCP register writer built on `tokio-modbus`.

use std::time::Duration;

use async_trait::async_trait;
use tokio_modbus::client::{Context, tcp};
use tokio_modbus::prelude::*;

use super::{FieldbusConnection, FieldbusConnector, resolve};
use crate::config::ModbusConfig;
use crate::encoding::bytes_to_registers;
use crate::error::TransportError;

/// Connects to a Modbus TCP server and writes holding registers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioModbusConnector;

#[async_trait]
impl FieldbusConnector for TokioModbusConnector {
    async fn connect(
        &self,
        config: &ModbusConfig,
    ) -> Result<Box<dyn FieldbusConnection>, TransportError> {
        let timeout = config.timeout();
        let addr = resolve(&config.address, config.port).await?;

        let ctx = tokio::time::timeout(timeout, tcp::connect_slave(addr, Slave(config.unit_id)))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Box::new(ModbusConnection { ctx, timeout }))
    }
}

struct ModbusConnection {
    ctx: Context,
    timeout: Duration,
}

#[async_trait]
impl FieldbusConnection for ModbusConnection {
    async fn write_registers(
        &mut self,
        start: u16,
        count: u16,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        let words = bytes_to_registers(bytes);
        if words.len() != usize::from(count) || bytes.len() % 2 != 0 {
            return Err(TransportError::Protocol(format!(
                "{} bytes do not hold {} registers",
                bytes.len(),
                count
            )));
        }

        tokio::time::timeout(self.timeout, self.ctx.write_multiple_registers(start, &words))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(|e| TransportError::Io(e.to_string()))?
            .map_err(|e| TransportError::Protocol(format!("Exception: {:?}", e)))?;

        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), TransportError> {
        let mut this = *self;
        match this.ctx.disconnect().await {
            Ok(_) => Ok(()),
            Err(e) => Err(TransportError::Io(e.to_string())),
        }
    }
}
