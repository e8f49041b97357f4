use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;
use crate::function_code::FunctionCode;

/// An error observed during the scan, kept for the final error report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedError {
    pub address: Option<u16>,
    pub function_code: Option<FunctionCode>,
    pub error: DiscoveryError,
    pub occurred_at: DateTime<Utc>,
}

/// Progress and bookkeeping for an in-flight or completed scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanState {
    pub current_address: u16,
    pub current_function_code: Option<FunctionCode>,
    pub total_units: u64,
    pub processed: u64,
    pub accessible: u64,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub running: bool,
    pub paused: bool,
    pub collected_errors: Vec<CollectedError>,
}

impl ScanState {
    pub fn new(total_units: u64) -> Self {
        let now = Utc::now();
        Self {
            current_address: 0,
            current_function_code: None,
            total_units,
            processed: 0,
            accessible: 0,
            start_time: now,
            last_update: now,
            running: false,
            paused: false,
            collected_errors: Vec::new(),
        }
    }

    /// `processed <= totals` and `accessible <= processed` — the §3 invariants.
    pub fn is_consistent(&self) -> bool {
        self.processed <= self.total_units && self.accessible <= self.processed
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_units == 0 {
            return 100.0;
        }
        (self.processed as f64 / self.total_units as f64) * 100.0
    }

    pub fn record_unit(&mut self, address: u16, function_code: FunctionCode, accessible: bool) {
        self.current_address = address;
        self.current_function_code = Some(function_code);
        self.processed += 1;
        if accessible {
            self.accessible += 1;
        }
        self.last_update = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_consistent() {
        let state = ScanState::new(100);
        assert!(state.is_consistent());
        assert_eq!(state.progress_percent(), 0.0);
    }

    #[test]
    fn record_unit_advances_counters() {
        let mut state = ScanState::new(2);
        state.record_unit(0, FunctionCode::Coils, true);
        state.record_unit(1, FunctionCode::Coils, false);
        assert_eq!(state.processed, 2);
        assert_eq!(state.accessible, 1);
        assert!(state.is_consistent());
        assert_eq!(state.progress_percent(), 100.0);
    }
}
