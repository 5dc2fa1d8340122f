use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Milliseconds in a nominal 24-hour cycle
pub const MS_PER_DAY: i64 = 86_400_000;

/// Reading types that are statistically visualized
///
/// Anything outside this whitelist is silently excluded at ingest time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingType {
    /// Continuous glucose monitor reading (sensor, typically every 5 minutes)
    Cbg,
    /// Self-monitored glucose reading (discrete fingerstick)
    Smbg,
}

impl ReadingType {
    pub const ALL: [ReadingType; 2] = [ReadingType::Cbg, ReadingType::Smbg];

    /// Parse an external type discriminator; `None` for non-visualized types
    pub fn from_tag(tag: &str) -> Option<ReadingType> {
        match tag {
            "cbg" => Some(ReadingType::Cbg),
            "smbg" => Some(ReadingType::Smbg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingType::Cbg => "cbg",
            ReadingType::Smbg => "smbg",
        }
    }
}

impl std::fmt::Display for ReadingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Day of the week, serialized as the lowercase full name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn from_chrono(day: chrono::Weekday) -> Weekday {
        match day {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }

    /// Monday-based index in [0, 7), used by the weekday view
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }
}

/// Kind of an out-of-range annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Low,
    High,
}

/// Annotation attached by upstream ingestion when a device reports a
/// measurement at or near its hardware limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfRangeMarker {
    /// Annotation code from the upstream pipeline (e.g. "bg/out-of-range")
    pub code: String,

    /// Which end of the measurable range was hit
    pub value: MarkerKind,

    /// Device-reported threshold in mg/dL
    pub threshold: f64,
}

/// External input record, prior to normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    /// Type discriminator ("cbg", "smbg", or a non-visualized type)
    #[serde(rename = "type")]
    pub reading_type: String,

    /// UTC instant as an RFC 3339 string
    pub time: String,

    /// Source-local display time, carried through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_time: Option<String>,

    /// Glucose value in mg/dL
    pub value: f64,

    /// Upstream record identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Reporting device identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Out-of-range annotations placed by upstream ingestion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<OutOfRangeMarker>,
}

/// Canonical record, immutable once created
///
/// `ms_since_local_midnight` is the wall-clock offset from true local
/// midnight in the resolved timezone, always in `[0, MS_PER_DAY)`.
/// Recomputing it for the same `(utc_instant, timezone)` pair is idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    /// Record identifier (upstream id, or a generated UUID)
    pub id: String,

    /// Reading type
    #[serde(rename = "type")]
    pub reading_type: ReadingType,

    /// Glucose value in mg/dL
    pub value: f64,

    /// Epoch milliseconds of the UTC instant
    pub utc_instant: i64,

    /// Calendar date in the resolved timezone
    pub local_date: NaiveDate,

    /// Day of the week in the resolved timezone
    pub weekday: Weekday,

    /// Wall-clock milliseconds since local midnight, in [0, 86400000)
    pub ms_since_local_midnight: i64,

    /// Reporting device identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Carried out-of-range annotations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<OutOfRangeMarker>,
}

/// Glucose classification boundaries in mg/dL
///
/// The outer thresholds are only required for five-way classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub very_low_threshold: Option<f64>,

    pub target_lower_bound: f64,

    pub target_upper_bound: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub very_high_threshold: Option<f64>,
}

impl Default for BgBounds {
    fn default() -> Self {
        Self {
            very_low_threshold: Some(55.0),
            target_lower_bound: 70.0,
            target_upper_bound: 180.0,
            very_high_threshold: Some(300.0),
        }
    }
}

/// Caller-supplied timezone preferences, resolved to one IANA timezone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePrefs {
    pub timezone_aware: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_name: Option<String>,
}

impl Default for TimePrefs {
    fn default() -> Self {
        Self {
            timezone_aware: false,
            timezone_name: None,
        }
    }
}

/// Weekday visibility toggles for the weekday view
///
/// Serialized with the abbreviated day names used on the worker protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWeekdays {
    #[serde(rename = "mon")]
    pub monday: bool,
    #[serde(rename = "tue")]
    pub tuesday: bool,
    #[serde(rename = "wed")]
    pub wednesday: bool,
    #[serde(rename = "thu")]
    pub thursday: bool,
    #[serde(rename = "fri")]
    pub friday: bool,
    #[serde(rename = "sat")]
    pub saturday: bool,
    #[serde(rename = "sun")]
    pub sunday: bool,
}

impl ActiveWeekdays {
    pub fn all() -> Self {
        Self {
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: true,
            sunday: true,
        }
    }

    pub fn none() -> Self {
        Self {
            monday: false,
            tuesday: false,
            wednesday: false,
            thursday: false,
            friday: false,
            saturday: false,
            sunday: false,
        }
    }

    pub fn is_active(&self, day: Weekday) -> bool {
        match day {
            Weekday::Monday => self.monday,
            Weekday::Tuesday => self.tuesday,
            Weekday::Wednesday => self.wednesday,
            Weekday::Thursday => self.thursday,
            Weekday::Friday => self.friday,
            Weekday::Saturday => self.saturday,
            Weekday::Sunday => self.sunday,
        }
    }
}

impl Default for ActiveWeekdays {
    fn default() -> Self {
        Self::all()
    }
}

/// Conservative aggregation of device-reported out-of-range thresholds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RangeBoundaries {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
}

/// Per-bin descriptive statistics
///
/// The positional fields (`id`, `ms_x`, `ms_from`, `ms_to`) are always
/// present so the full bin-key space can be rendered; every statistic is an
/// explicit `Option` so "not enough data" is a typed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinStatistics {
    /// Stringified bin midpoint, stable key for animated transitions
    pub id: String,

    /// Bin midpoint in ms since local midnight
    pub ms_x: i64,

    /// Bin left edge in ms since local midnight
    pub ms_from: i64,

    /// Bin right edge in ms since local midnight
    pub ms_to: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_quantile: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_quartile: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub third_quartile: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_quantile: Option<f64>,

    /// Aggregated device thresholds, present when any marker fell in the bin
    #[serde(
        rename = "outOfRangeThresholds",
        skip_serializing_if = "Option::is_none"
    )]
    pub out_of_range: Option<RangeBoundaries>,
}

impl BinStatistics {
    /// An all-empty bin carrying only its positional fields
    pub fn empty(key: i64, bin_width_ms: i64) -> Self {
        Self {
            id: key.to_string(),
            ms_x: key,
            ms_from: key - bin_width_ms / 2,
            ms_to: key + bin_width_ms / 2,
            min: None,
            mean: None,
            max: None,
            lower_quantile: None,
            first_quartile: None,
            median: None,
            third_quartile: None,
            upper_quantile: None,
            out_of_range: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_type_tags() {
        assert_eq!(ReadingType::from_tag("cbg"), Some(ReadingType::Cbg));
        assert_eq!(ReadingType::from_tag("smbg"), Some(ReadingType::Smbg));
        assert_eq!(ReadingType::from_tag("basal"), None);
        assert_eq!(ReadingType::from_tag("bolus"), None);
    }

    #[test]
    fn test_weekday_roundtrip() {
        for day in Weekday::ALL {
            let json = serde_json::to_string(&day).unwrap();
            assert_eq!(json, format!("\"{}\"", day.as_str()));
            let back: Weekday = serde_json::from_str(&json).unwrap();
            assert_eq!(back, day);
        }
    }

    #[test]
    fn test_weekday_indices_cover_week() {
        let indices: Vec<usize> = Weekday::ALL.iter().map(|d| d.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_raw_reading_deserializes_wire_shape() {
        let raw: RawReading = serde_json::from_str(
            r#"{
                "type": "cbg",
                "time": "2014-03-06T00:00:00.001Z",
                "deviceTime": "2014-03-05T16:00:00",
                "value": 112.0,
                "deviceId": "DexG4Rec_XXXXXXXXX",
                "annotations": [
                    {"code": "bg/out-of-range", "value": "high", "threshold": 400.0}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(raw.reading_type, "cbg");
        assert_eq!(raw.annotations.len(), 1);
        assert_eq!(raw.annotations[0].value, MarkerKind::High);
        assert_eq!(raw.annotations[0].threshold, 400.0);
    }

    #[test]
    fn test_empty_bin_keeps_positional_fields_only() {
        let bin = BinStatistics::empty(1_800_000, 3_600_000);
        assert_eq!(bin.id, "1800000");
        assert_eq!(bin.ms_x, 1_800_000);
        assert_eq!(bin.ms_from, 0);
        assert_eq!(bin.ms_to, 3_600_000);
        assert!(bin.min.is_none());
        assert!(bin.median.is_none());

        let json = serde_json::to_value(&bin).unwrap();
        assert!(json.get("median").is_none());
        assert!(json.get("msX").is_some());
    }

    #[test]
    fn test_active_weekdays_toggles() {
        let mut days = ActiveWeekdays::all();
        assert!(days.is_active(Weekday::Wednesday));
        days.wednesday = false;
        assert!(!days.is_active(Weekday::Wednesday));
        assert!(days.is_active(Weekday::Thursday));
        assert!(!ActiveWeekdays::none().is_active(Weekday::Sunday));
    }
}
