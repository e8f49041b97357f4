use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::options::ScanOptions;
use crate::record::DiscoveryRecord;
use crate::state::ScanState;

/// Schema version for the on-disk checkpoint format. Compared exact-match
/// by the Scan State Manager (see DESIGN.md for the forward-compat tradeoff).
pub const CHECKPOINT_SCHEMA_VERSION: &str = "1.0";

/// The full persisted snapshot of an interrupted scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentCheckpoint {
    pub schema_version: String,
    pub config: ScanConfig,
    pub options: ScanOptions,
    pub state: ScanState,
    pub records: Vec<DiscoveryRecord>,
    pub saved_at: DateTime<Utc>,
}

impl PersistentCheckpoint {
    pub fn new(
        config: ScanConfig,
        options: ScanOptions,
        state: ScanState,
        records: Vec<DiscoveryRecord>,
    ) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION.to_string(),
            config,
            options,
            state,
            records,
            saved_at: Utc::now(),
        }
    }
}
