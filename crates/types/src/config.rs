use serde::{Deserialize, Serialize};

/// Connection parameters for the Modbus/TCP slave being scanned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    /// Per-request timeout, enforced to be >= 1000ms.
    pub timeout_ms: u64,
    pub retry_count: usize,
    /// Device-reported max units per request; used as a batch cap alongside
    /// the FC's own protocol limit (whichever is smaller wins).
    pub max_units_per_request: u16,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScanConfigError {
    #[error("port must be between 1 and 65535")]
    InvalidPort,
    #[error("slave id must be between 1 and 247")]
    InvalidSlaveId,
    #[error("timeout_ms must be >= 1000")]
    TimeoutTooLow,
    #[error("max_units_per_request must be >= 1 and <= 125")]
    InvalidMaxUnits,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            slave_id: 1,
            timeout_ms: 1_000,
            retry_count: 2,
            max_units_per_request: 125,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ScanConfigError> {
        if self.port == 0 {
            return Err(ScanConfigError::InvalidPort);
        }
        if self.slave_id == 0 || self.slave_id > 247 {
            return Err(ScanConfigError::InvalidSlaveId);
        }
        if self.timeout_ms < 1_000 {
            return Err(ScanConfigError::TimeoutTooLow);
        }
        if self.max_units_per_request == 0 || self.max_units_per_request > 125 {
            return Err(ScanConfigError::InvalidMaxUnits);
        }
        Ok(())
    }
}
