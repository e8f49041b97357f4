use serde::{Deserialize, Serialize};

/// Closed classification of why a single address turned out inaccessible.
///
/// Protocol exception variants carry the Modbus exception code when the
/// transport reported one; the remaining variants are synthesized by the
/// reader from transport-level or decoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadErrorKind {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Acknowledge,
    SlaveDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailed,
    ConnectionRefused,
    Timeout,
    Transport,
    Decode,
    Unknown,
}

impl ReadErrorKind {
    /// Maps a Modbus exception code byte (0x01..0x0B) to its classification.
    pub fn from_exception_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(ReadErrorKind::IllegalFunction),
            0x02 => Some(ReadErrorKind::IllegalDataAddress),
            0x03 => Some(ReadErrorKind::IllegalDataValue),
            0x04 => Some(ReadErrorKind::SlaveDeviceFailure),
            0x05 => Some(ReadErrorKind::Acknowledge),
            0x06 => Some(ReadErrorKind::SlaveDeviceBusy),
            0x08 => Some(ReadErrorKind::MemoryParityError),
            0x0A => Some(ReadErrorKind::GatewayPathUnavailable),
            0x0B => Some(ReadErrorKind::GatewayTargetFailed),
            _ => None,
        }
    }

    pub const fn is_protocol_exception(self) -> bool {
        !matches!(
            self,
            ReadErrorKind::ConnectionRefused
                | ReadErrorKind::Timeout
                | ReadErrorKind::Transport
                | ReadErrorKind::Decode
                | ReadErrorKind::Unknown
        )
    }
}

/// A classified error attached to an inaccessible discovery record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryError {
    pub kind: ReadErrorKind,
    pub exception_code: Option<u8>,
    pub message: String,
    pub description: String,
}

impl DiscoveryError {
    pub fn new(kind: ReadErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let description = describe(kind);
        Self {
            kind,
            exception_code: None,
            message,
            description,
        }
    }

    pub fn with_exception_code(mut self, code: u8) -> Self {
        self.exception_code = Some(code);
        self
    }
}

fn describe(kind: ReadErrorKind) -> String {
    match kind {
        ReadErrorKind::IllegalFunction => "the device does not support this function code".into(),
        ReadErrorKind::IllegalDataAddress => "the device has no data at this address".into(),
        ReadErrorKind::IllegalDataValue => "the request quantity is not valid for this device".into(),
        ReadErrorKind::SlaveDeviceFailure => "an unrecoverable error occurred on the device".into(),
        ReadErrorKind::Acknowledge => "the device accepted the request but needs more time".into(),
        ReadErrorKind::SlaveDeviceBusy => "the device is processing a long-duration command".into(),
        ReadErrorKind::MemoryParityError => "the device detected a parity error in extended memory".into(),
        ReadErrorKind::GatewayPathUnavailable => "a gateway could not route to the target device".into(),
        ReadErrorKind::GatewayTargetFailed => "the target device behind a gateway failed to respond".into(),
        ReadErrorKind::ConnectionRefused => "the transport connection was refused".into(),
        ReadErrorKind::Timeout => "the request timed out".into(),
        ReadErrorKind::Transport => "a transport-level error occurred".into(),
        ReadErrorKind::Decode => "the response payload failed type or length validation".into(),
        ReadErrorKind::Unknown => "an unclassified error occurred".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_code_roundtrip() {
        for code in [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x08, 0x0A, 0x0B] {
            assert!(ReadErrorKind::from_exception_code(code).is_some());
        }
        assert!(ReadErrorKind::from_exception_code(0x07).is_none());
    }

    #[test]
    fn protocol_exceptions_are_flagged() {
        assert!(ReadErrorKind::IllegalDataAddress.is_protocol_exception());
        assert!(!ReadErrorKind::Timeout.is_protocol_exception());
        assert!(!ReadErrorKind::Decode.is_protocol_exception());
    }
}
