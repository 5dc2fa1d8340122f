// Library interface for the glucotrend core
// Temporal indexing, timezone-sensitive normalization, and quantile/bin
// statistics over glucose readings; rendering and transport live elsewhere.

pub mod binning;
pub mod config;
pub mod devices;
pub mod error;
pub mod index;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod worker;

// Re-export commonly used types for convenience
pub use binning::{
    bin_key, bin_key_space, classify, determine_range_boundaries, munge_bins, quantile,
    stats_for_bin, Category, ClassificationMode, DEFAULT_BIN_WIDTH_MS, DEFAULT_OUTER_QUANTILES,
};
pub use config::{AppConfig, BinningSettings};
pub use devices::{DeviceProfile, DeviceTable, DEFAULT_SAMPLE_INTERVAL_MS};
pub use error::{GlucoTrendError, Result};
pub use index::TemporalIndex;
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use models::{
    ActiveWeekdays, BgBounds, BinStatistics, MarkerKind, NormalizedRecord, OutOfRangeMarker,
    RangeBoundaries, RawReading, ReadingType, TimePrefs, Weekday, MS_PER_DAY,
};
pub use normalize::{normalize, resolve_timezone};
pub use worker::{FilterComplete, IndexWorkerHandle, IngestComplete, WireRequest};
