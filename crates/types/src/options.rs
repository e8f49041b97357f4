use serde::{Deserialize, Serialize};

use crate::address::AddressRange;
use crate::function_code::FunctionCode;

/// Per-scan knobs: which addresses, which function codes, and which
/// optimizations are switched on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub address_range: AddressRange,
    pub function_codes: Vec<FunctionCode>,
    pub enable_batching: bool,
    pub enable_streaming: bool,
    pub streaming_threshold: usize,
    pub enable_memory_optimization: bool,
    pub enable_network_optimization: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScanOptionsError {
    #[error("function_codes must not be empty")]
    NoFunctionCodes,
    #[error("streaming_threshold must be >= 1")]
    InvalidStreamingThreshold,
}

impl ScanOptions {
    pub fn validate(&self) -> Result<(), ScanOptionsError> {
        if self.function_codes.is_empty() {
            return Err(ScanOptionsError::NoFunctionCodes);
        }
        if self.streaming_threshold == 0 {
            return Err(ScanOptionsError::InvalidStreamingThreshold);
        }
        Ok(())
    }

    /// Total units that will be probed: |addresses| * |function codes|.
    pub fn total_units(&self) -> u64 {
        u64::from(self.address_range.len()) * self.function_codes.len() as u64
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            address_range: AddressRange::new(0, 65535).expect("0..=65535 is valid"),
            function_codes: vec![FunctionCode::HoldingRegisters],
            enable_batching: true,
            enable_streaming: true,
            streaming_threshold: 1_000,
            enable_memory_optimization: true,
            enable_network_optimization: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_function_codes() {
        let mut options = ScanOptions::default();
        options.function_codes.clear();
        assert_eq!(options.validate(), Err(ScanOptionsError::NoFunctionCodes));
    }

    #[test]
    fn total_units_multiplies_addresses_by_fcs() {
        let mut options = ScanOptions::default();
        options.address_range = AddressRange::new(0, 9).unwrap();
        options.function_codes = vec![FunctionCode::Coils, FunctionCode::HoldingRegisters];
        assert_eq!(options.total_units(), 20);
    }
}
