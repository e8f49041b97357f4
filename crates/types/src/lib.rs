//! Shared data model for the Modbus register discovery scanner: function
//! codes, address ranges, discovery records, scan configuration/options/
//! state, and the persisted checkpoint shape.

mod address;
mod checkpoint;
mod config;
mod error;
mod function_code;
mod options;
mod record;
mod state;
mod timing;

pub use address::{AddressRange, AddressRangeError};
pub use checkpoint::{PersistentCheckpoint, CHECKPOINT_SCHEMA_VERSION};
pub use config::{ScanConfig, ScanConfigError};
pub use error::{DiscoveryError, ReadErrorKind};
pub use function_code::FunctionCode;
pub use options::{ScanOptions, ScanOptionsError};
pub use record::{DiscoveryRecord, RegisterValue};
pub use state::{CollectedError, ScanState};
pub use timing::RequestTimingRecord;
