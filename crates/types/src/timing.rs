use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One observed request's timing, fed to the Network Optimizer's adaptive
/// pacing rule and retained in a ring buffer of at most 1000 entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTimingRecord {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub success: bool,
    pub byte_estimate: usize,
    pub error_message: Option<String>,
}

impl RequestTimingRecord {
    pub fn success(start: DateTime<Utc>, end: DateTime<Utc>, byte_estimate: usize) -> Self {
        Self {
            start,
            end,
            duration: to_duration(start, end),
            success: true,
            byte_estimate,
            error_message: None,
        }
    }

    pub fn failure(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        byte_estimate: usize,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            start,
            end,
            duration: to_duration(start, end),
            success: false,
            byte_estimate,
            error_message: Some(error_message.into()),
        }
    }
}

fn to_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - start).to_std().unwrap_or(Duration::ZERO)
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (value.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
