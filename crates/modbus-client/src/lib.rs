#![allow(dead_code)]

//! Thin adapter over `tokio-modbus`'s TCP client: connect, per-function-code
//! read, and the timeout/slave-id knobs the engine needs. This crate does
//! not retry and does not buffer across requests — see `ClientError` for the
//! distinction between a transport failure and a protocol exception, and
//! `register-reader` for the layer that turns either into a classified,
//! per-address outcome.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::tcp;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::{Reader, Slave, SlaveContext};
use tracing::{debug, warn};

use types::FunctionCode;

const DEFAULT_TIMEOUT_MS: u64 = 1_000;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid socket address {0}:{1}")]
    InvalidAddress(String, u16),
    #[error("connection refused connecting to {0}:{1}")]
    ConnectionRefused(String, u16),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("device returned modbus exception {code:#04x}")]
    Exception { code: u8 },
    #[error("address {address} + count {count} overflows the 16-bit address space")]
    AddressOverflow { address: u16, count: u16 },
}

/// The decoded payload of a single read, before the Register Reader applies
/// its type/length invariants.
#[derive(Debug, Clone)]
pub enum ReadPayload {
    Bits(Vec<bool>),
    Words(Vec<u16>),
}

/// Thin, non-retrying facade over a single Modbus/TCP connection. Not
/// thread-safe across re-entrant calls beyond the internal `Mutex` that
/// serializes access to the underlying `Context` — matching the protocol's
/// one-outstanding-request-per-connection constraint.
pub struct ModbusClient {
    context: Mutex<Context>,
    timeout: Duration,
}

impl ModbusClient {
    pub async fn connect(host: &str, port: u16) -> Result<Self, ClientError> {
        let addr = format!("{host}:{port}")
            .parse::<SocketAddr>()
            .map_err(|_| ClientError::InvalidAddress(host.to_string(), port))?;
        let context = tcp::connect(addr).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::ConnectionRefused {
                ClientError::ConnectionRefused(host.to_string(), port)
            } else {
                ClientError::Io(err)
            }
        })?;
        Ok(Self {
            context: Mutex::new(context),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        })
    }

    /// Sets the unit/slave id used by subsequent reads.
    pub async fn set_slave(&self, slave_id: u8) {
        let mut ctx = self.context.lock().await;
        ctx.set_slave(Slave(slave_id));
    }

    /// Sets the per-request timeout used by subsequent reads.
    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout = Duration::from_millis(timeout_ms);
    }

    /// Issues exactly one read of `count` units at `address` for `fc`. Never
    /// retries: a timed-out or refused request is surfaced as-is so the
    /// caller (the engine) can decide whether to reconnect.
    pub async fn read(
        &self,
        fc: FunctionCode,
        address: u16,
        count: u16,
    ) -> Result<ReadPayload, ClientError> {
        if u32::from(address) + u32::from(count) > u32::from(u16::MAX) + 1 {
            return Err(ClientError::AddressOverflow { address, count });
        }

        let mut ctx = self.context.lock().await;
        let result = match fc {
            FunctionCode::Coils => timeout(self.timeout, ctx.read_coils(address, count))
                .await
                .map(|inner| inner.map(|res| res.map(ReadPayload::Bits))),
            FunctionCode::DiscreteInputs => {
                timeout(self.timeout, ctx.read_discrete_inputs(address, count))
                    .await
                    .map(|inner| inner.map(|res| res.map(ReadPayload::Bits)))
            }
            FunctionCode::HoldingRegisters => {
                timeout(self.timeout, ctx.read_holding_registers(address, count))
                    .await
                    .map(|inner| inner.map(|res| res.map(ReadPayload::Words)))
            }
            FunctionCode::InputRegisters => {
                timeout(self.timeout, ctx.read_input_registers(address, count))
                    .await
                    .map(|inner| inner.map(|res| res.map(ReadPayload::Words)))
            }
        };

        match result {
            Ok(Ok(Ok(payload))) => {
                debug!(?fc, address, count, "modbus read ok");
                Ok(payload)
            }
            Ok(Ok(Err(exception))) => {
                let code = exception as u8;
                warn!(?fc, address, count, code, "modbus exception");
                Err(ClientError::Exception { code })
            }
            Ok(Err(err)) => {
                warn!(?fc, address, count, error = %err, "modbus transport error");
                Err(ClientError::Io(err))
            }
            Err(_) => {
                warn!(?fc, address, count, timeout_ms = self.timeout.as_millis(), "modbus read timeout");
                Err(ClientError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Drops the underlying connection. `ModbusClient` does not reconnect
    /// itself; reconnection after a lost connection is the engine's concern.
    pub async fn close(self) {
        drop(self.context.into_inner());
    }
}
