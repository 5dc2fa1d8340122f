//! Device sampling-rate table
//!
//! Maps device identifier families to their native sampling interval and a
//! statistical weight, so devices sampling less often than the 5-minute
//! baseline do not bias data-sufficiency decisions.

use serde::{Deserialize, Serialize};

use crate::models::NormalizedRecord;

/// Baseline continuous sampling interval (5 minutes)
pub const DEFAULT_SAMPLE_INTERVAL_MS: i64 = 300_000;

/// Sampling profile for a device family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Device id prefix identifying the family
    pub id_prefix: String,

    /// Native sampling interval in milliseconds
    pub interval_ms: i64,

    /// Records from this family count as this many samples
    pub weight: u32,

    /// Human-readable description
    pub description: String,
}

impl DeviceProfile {
    /// Check whether this profile applies to a given device id
    pub fn applies_to(&self, device_id: &str) -> bool {
        device_id.starts_with(&self.id_prefix)
    }
}

/// Registry of known under-sampling device families
#[derive(Debug, Clone)]
pub struct DeviceTable {
    profiles: Vec<DeviceProfile>,
}

impl DeviceTable {
    /// Build the registry of built-in device profiles
    pub fn builtin() -> Self {
        Self {
            profiles: vec![DeviceProfile {
                id_prefix: "AbbottFreeStyleLibre".to_string(),
                interval_ms: 900_000,
                weight: 3,
                description: "Abbott FreeStyle Libre family (15-minute flash readings)"
                    .to_string(),
            }],
        }
    }

    /// Find the profile matching a device id, if any
    pub fn lookup(&self, device_id: &str) -> Option<&DeviceProfile> {
        self.profiles.iter().find(|p| p.applies_to(device_id))
    }

    /// Native sampling interval for a record's device
    pub fn sample_interval(&self, record: &NormalizedRecord) -> i64 {
        record
            .device_id
            .as_deref()
            .and_then(|id| self.lookup(id))
            .map(|p| p.interval_ms)
            .unwrap_or(DEFAULT_SAMPLE_INTERVAL_MS)
    }

    /// Statistical weight for a record's device
    pub fn sample_weight(&self, record: &NormalizedRecord) -> u32 {
        record
            .device_id
            .as_deref()
            .and_then(|id| self.lookup(id))
            .map(|p| p.weight)
            .unwrap_or(1)
    }

    /// Device-weighted sample count over a set of records
    ///
    /// A record from a family sampling at 3x the baseline interval counts as
    /// 3 samples, keeping "is there enough data" comparable across devices.
    pub fn weighted_sample_count(&self, records: &[NormalizedRecord]) -> u64 {
        records
            .iter()
            .map(|r| u64::from(self.sample_weight(r)))
            .sum()
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::builtin()
    }
}
