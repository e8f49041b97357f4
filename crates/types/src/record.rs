use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;
use crate::function_code::FunctionCode;

/// The decoded value of a single unit: a bit for FC 1/2, a 16-bit word for FC 3/4.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterValue {
    Bool(bool),
    U16(u16),
}

impl RegisterValue {
    pub fn default_for(fc: FunctionCode) -> Self {
        if fc.is_bit_type() {
            RegisterValue::Bool(false)
        } else {
            RegisterValue::U16(0)
        }
    }

    pub fn matches_fc(&self, fc: FunctionCode) -> bool {
        match (self, fc.is_bit_type()) {
            (RegisterValue::Bool(_), true) => true,
            (RegisterValue::U16(_), false) => true,
            _ => false,
        }
    }
}

/// One probed (address, function code) outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub address: u16,
    pub function_code: FunctionCode,
    pub data_type: String,
    pub value: RegisterValue,
    pub accessible: bool,
    pub timestamp: DateTime<Utc>,
    pub error: Option<DiscoveryError>,
}

impl DiscoveryRecord {
    pub fn accessible(address: u16, function_code: FunctionCode, value: RegisterValue) -> Self {
        debug_assert!(value.matches_fc(function_code));
        Self {
            address,
            function_code,
            data_type: function_code.tag().to_string(),
            value,
            accessible: true,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn inaccessible(address: u16, function_code: FunctionCode, error: DiscoveryError) -> Self {
        Self {
            address,
            function_code,
            data_type: function_code.tag().to_string(),
            value: RegisterValue::default_for(function_code),
            accessible: false,
            timestamp: Utc::now(),
            error: Some(error),
        }
    }

    /// `accessible` ⇔ `error` absent — the data-model invariant from spec §3.
    pub fn is_consistent(&self) -> bool {
        self.accessible == self.error.is_none() && self.value.matches_fc(self.function_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadErrorKind;

    #[test]
    fn accessible_record_has_no_error() {
        let record = DiscoveryRecord::accessible(
            5,
            FunctionCode::HoldingRegisters,
            RegisterValue::U16(1234),
        );
        assert!(record.is_consistent());
        assert!(record.error.is_none());
    }

    #[test]
    fn inaccessible_record_carries_default_value() {
        let record = DiscoveryRecord::inaccessible(
            5,
            FunctionCode::Coils,
            DiscoveryError::new(ReadErrorKind::IllegalDataAddress, "no data"),
        );
        assert!(record.is_consistent());
        assert_eq!(record.value, RegisterValue::Bool(false));
    }
}
