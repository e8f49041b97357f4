#![allow(dead_code)]

//! Issues typed reads against a [`ModbusClient`] and decodes the response
//! into [`DiscoveryRecord`]s. This is the single place that enforces the
//! value-type and length invariants from the data model — the facade
//! returns weakly-typed payloads, this crate turns them into strictly typed,
//! always-present records.

use thiserror::Error;
use tracing::{debug, warn};

use modbus_client::{ClientError, ModbusClient, ReadPayload};
use types::{DiscoveryError, DiscoveryRecord, FunctionCode, ReadErrorKind, RegisterValue};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReaderError {
    #[error("count must be >= 1")]
    ZeroCount,
    #[error("count {count} exceeds the protocol maximum {max} units for this function code")]
    CountTooLarge { count: u16, max: u16 },
}

/// Reads and decodes responses for one function code at a time, classifying
/// any failure into the closed `ReadErrorKind` set rather than ever
/// returning a partial record list.
pub struct RegisterReader<'a> {
    client: &'a ModbusClient,
}

impl<'a> RegisterReader<'a> {
    pub fn new(client: &'a ModbusClient) -> Self {
        Self { client }
    }

    /// Reads `count` units starting at `address` for `fc`. Always returns
    /// exactly `count` records on success *and* on any device/transport
    /// failure — the only way this returns `Err` is a precondition
    /// violation that must fail before any device I/O.
    pub async fn read(
        &self,
        address: u16,
        count: u16,
        fc: FunctionCode,
    ) -> Result<Vec<DiscoveryRecord>, ReaderError> {
        if count == 0 {
            return Err(ReaderError::ZeroCount);
        }
        let max = fc.protocol_max_units();
        if count > max {
            return Err(ReaderError::CountTooLarge { count, max });
        }

        match self.client.read(fc, address, count).await {
            Ok(payload) => Ok(decode(address, count, fc, payload)),
            Err(err) => {
                let error = classify(&err);
                debug!(?fc, address, count, kind = ?error.kind, "read classified as error");
                Ok(inaccessible_run(address, count, fc, error))
            }
        }
    }

    /// `read(address, 1, fc)`, returning the sole record.
    pub async fn read_one(
        &self,
        address: u16,
        fc: FunctionCode,
    ) -> Result<DiscoveryRecord, ReaderError> {
        let mut records = self.read(address, 1, fc).await?;
        Ok(records.remove(0))
    }
}

fn decode(address: u16, count: u16, fc: FunctionCode, payload: ReadPayload) -> Vec<DiscoveryRecord> {
    let values: Vec<RegisterValue> = match payload {
        ReadPayload::Bits(bits) => bits.into_iter().map(RegisterValue::Bool).collect(),
        ReadPayload::Words(words) => words.into_iter().map(RegisterValue::U16).collect(),
    };

    if values.len() != count as usize {
        warn!(
            ?fc,
            address,
            expected = count,
            actual = values.len(),
            "decoded payload length mismatch"
        );
        let error = DiscoveryError::new(
            ReadErrorKind::Decode,
            format!(
                "expected {count} decoded units, response carried {}",
                values.len()
            ),
        );
        return inaccessible_run(address, count, fc, error);
    }

    values
        .into_iter()
        .enumerate()
        .map(|(offset, value)| {
            let unit_address = address.wrapping_add(offset as u16);
            DiscoveryRecord::accessible(unit_address, fc, value)
        })
        .collect()
}

fn inaccessible_run(
    address: u16,
    count: u16,
    fc: FunctionCode,
    error: DiscoveryError,
) -> Vec<DiscoveryRecord> {
    (0..count)
        .map(|offset| {
            let unit_address = address.wrapping_add(offset);
            DiscoveryRecord::inaccessible(unit_address, fc, error.clone())
        })
        .collect()
}

/// Maps a transport-facade failure onto the closed `ReadErrorKind` set.
fn classify(err: &ClientError) -> DiscoveryError {
    match err {
        ClientError::Exception { code } => {
            let kind = ReadErrorKind::from_exception_code(*code).unwrap_or(ReadErrorKind::Unknown);
            DiscoveryError::new(kind, format!("device returned exception {code:#04x}"))
                .with_exception_code(*code)
        }
        ClientError::Timeout { timeout_ms } => DiscoveryError::new(
            ReadErrorKind::Timeout,
            format!("request timed out after {timeout_ms}ms"),
        ),
        ClientError::ConnectionRefused(host, port) => DiscoveryError::new(
            ReadErrorKind::ConnectionRefused,
            format!("connection to {host}:{port} was refused"),
        ),
        ClientError::InvalidAddress(host, port) => DiscoveryError::new(
            ReadErrorKind::Transport,
            format!("invalid socket address {host}:{port}"),
        ),
        ClientError::AddressOverflow { address, count } => DiscoveryError::new(
            ReadErrorKind::Transport,
            format!("address {address} + count {count} overflows the address space"),
        ),
        ClientError::Io(io_err) => {
            DiscoveryError::new(ReadErrorKind::Transport, format!("transport error: {io_err}"))
        }
    }
}
