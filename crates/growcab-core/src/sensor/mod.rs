pub mod poller;

pub use poller::SensorPoller;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reading as served by the cabinet's sensor endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub temp_c: Option<f64>,
    #[serde(default)]
    pub humidity_percent: Option<f64>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl SensorSnapshot {
    /// The reading time, when the endpoint sent a valid RFC 3339 timestamp.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// What consumers observe about the poller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PollState {
    pub data: Option<SensorSnapshot>,
    pub error: Option<String>,
    pub is_loading: bool,
    pub last_success_at: Option<DateTime<Utc>>,
}
