use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::{Reader, Slave, Writer};
use tracing::{debug, info, warn};

/// Configuration options for connecting to a Modbus TCP device.
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 1,
            timeout_ms: 1_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid socket address {0}:{1}")]
    InvalidAddress(String, u16),
    #[error("modbus transport error: {0}")]
    Modbus(std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("expected {expected} registers, received {received}")]
    ShortRead { expected: u16, received: usize },
    #[error("register address overflow")]
    AddressOverflow,
}

/// Word-addressed block access to one device. One call is one request on the wire.
#[async_trait]
pub trait RegisterTransport: Send + Sync {
    async fn read_holding_registers(&self, start: u16, count: u16) -> Result<Vec<u16>, ClientError>;

    async fn write_registers(&self, start: u16, values: &[u16]) -> Result<(), ClientError>;
}

/// A Modbus TCP connection that connects lazily and reconnects on the next request
/// after any transport failure. Requests are serialized per connection.
#[derive(Debug)]
pub struct ModbusClient {
    config: ClientConfig,
    addr: SocketAddr,
    context: Mutex<Option<Context>>,
}

impl ModbusClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse::<SocketAddr>()
            .map_err(|_| ClientError::InvalidAddress(config.host.clone(), config.port))?;
        Ok(Self {
            config,
            addr,
            context: Mutex::new(None),
        })
    }

    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Self::new(config)?;
        {
            let mut ctx = client.context.lock().await;
            *ctx = Some(client.open().await?);
        }
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn open(&self) -> Result<Context, ClientError> {
        let request = tcp::connect_slave(self.addr, Slave(self.config.unit_id));
        match timeout(self.request_timeout(), request).await {
            Ok(Ok(context)) => {
                info!(addr = %self.addr, unit_id = self.config.unit_id, "modbus connected");
                Ok(context)
            }
            Ok(Err(err)) => Err(ClientError::Io(err)),
            Err(_) => Err(ClientError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }),
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    fn timeout_error(&self) -> ClientError {
        ClientError::Timeout {
            timeout_ms: self.config.timeout_ms,
        }
    }
}

#[async_trait]
impl RegisterTransport for ModbusClient {
    async fn read_holding_registers(&self, start: u16, count: u16) -> Result<Vec<u16>, ClientError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        u16::try_from(u32::from(start) + u32::from(count) - 1)
            .map_err(|_| ClientError::AddressOverflow)?;

        let mut guard = self.context.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let Some(ctx) = guard.as_mut() else {
            return Err(self.timeout_error());
        };

        let result = timeout(self.request_timeout(), ctx.read_holding_registers(start, count)).await;
        match result {
            Ok(Ok(values)) if values.len() == usize::from(count) => {
                debug!(unit_id = self.config.unit_id, start, count, "modbus read ok");
                Ok(values)
            }
            Ok(Ok(values)) => Err(ClientError::ShortRead {
                expected: count,
                received: values.len(),
            }),
            Ok(Err(err)) => {
                warn!(unit_id = self.config.unit_id, start, count, error = %err, "modbus read error");
                *guard = None;
                Err(ClientError::Modbus(err))
            }
            Err(_) => {
                warn!(unit_id = self.config.unit_id, start, count, "modbus read timeout");
                *guard = None;
                Err(self.timeout_error())
            }
        }
    }

    async fn write_registers(&self, start: u16, values: &[u16]) -> Result<(), ClientError> {
        if values.is_empty() {
            return Ok(());
        }
        let count = u32::try_from(values.len()).map_err(|_| ClientError::AddressOverflow)?;
        u16::try_from(u32::from(start) + count - 1).map_err(|_| ClientError::AddressOverflow)?;

        let mut guard = self.context.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let Some(ctx) = guard.as_mut() else {
            return Err(self.timeout_error());
        };

        let result = timeout(self.request_timeout(), ctx.write_multiple_registers(start, values)).await;
        match result {
            Ok(Ok(())) => {
                debug!(unit_id = self.config.unit_id, start, count, "modbus write ok");
                Ok(())
            }
            Ok(Err(err)) => {
                warn!(unit_id = self.config.unit_id, start, count, error = %err, "modbus write error");
                *guard = None;
                Err(ClientError::Modbus(err))
            }
            Err(_) => {
                warn!(unit_id = self.config.unit_id, start, count, "modbus write timeout");
                *guard = None;
                Err(self.timeout_error())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_address() {
        let config = ClientConfig {
            host: "not an ip".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            ModbusClient::new(config),
            Err(ClientError::InvalidAddress(_, 502))
        ));
    }

    #[tokio::test]
    async fn zero_length_requests_skip_the_wire() {
        let client = ModbusClient::new(ClientConfig::default()).expect("client");
        assert!(client
            .read_holding_registers(40_000, 0)
            .await
            .expect("read")
            .is_empty());
        client.write_registers(40_000, &[]).await.expect("write");
    }

    #[tokio::test]
    async fn overflowing_range_is_rejected_before_connecting() {
        let client = ModbusClient::new(ClientConfig::default()).expect("client");
        assert!(matches!(
            client.read_holding_registers(u16::MAX, 2).await,
            Err(ClientError::AddressOverflow)
        ));
    }
}
