//! Timezone-sensitive canonicalization of raw readings
//!
//! Converts an external reading into a [`NormalizedRecord`] carrying the
//! timezone-local calendar date, weekday, and milliseconds since local
//! midnight. Pure over its inputs plus the IANA timezone database.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::error::NormalizeError;
use crate::models::{NormalizedRecord, RawReading, ReadingType, TimePrefs, Weekday};

/// Resolve caller timezone preferences into a single IANA timezone.
///
/// Timezone-unaware callers (and aware callers that name no zone) fall back
/// to UTC, so local-time fields degrade to the UTC projection.
pub fn resolve_timezone(prefs: &TimePrefs) -> Result<Tz, NormalizeError> {
    if !prefs.timezone_aware {
        return Ok(Tz::UTC);
    }
    match &prefs.timezone_name {
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| NormalizeError::UnknownTimezone { name: name.clone() }),
        None => Ok(Tz::UTC),
    }
}

/// Normalize a raw reading into the canonical record form.
///
/// The wall-clock offset from local midnight is taken from the localized
/// instant's own time-of-day fields rather than modulo arithmetic on the UTC
/// epoch value, so daylight-saving transition days (23- or 25-hour local
/// days) still yield a value in `[0, 86_400_000)` that matches the local
/// clock. Computing the same `(instant, timezone)` pair twice is idempotent.
pub fn normalize(raw: &RawReading, tz: Tz) -> Result<NormalizedRecord, NormalizeError> {
    let reading_type = ReadingType::from_tag(&raw.reading_type).ok_or_else(|| {
        NormalizeError::UnsupportedType {
            tag: raw.reading_type.clone(),
        }
    })?;

    let utc: DateTime<Utc> = DateTime::parse_from_rfc3339(&raw.time)
        .map_err(|source| NormalizeError::InvalidTimestamp {
            raw: raw.time.clone(),
            source,
        })?
        .with_timezone(&Utc);

    let local = utc.with_timezone(&tz);
    let ms_since_local_midnight =
        i64::from(local.num_seconds_from_midnight()) * 1_000 + i64::from(local.timestamp_subsec_millis());

    Ok(NormalizedRecord {
        id: raw
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        reading_type,
        value: raw.value,
        utc_instant: utc.timestamp_millis(),
        local_date: local.date_naive(),
        weekday: Weekday::from_chrono(local.weekday()),
        ms_since_local_midnight,
        device_id: raw.device_id.clone(),
        annotations: raw.annotations.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MS_PER_DAY;
    use chrono::NaiveDate;

    fn raw(time: &str) -> RawReading {
        RawReading {
            reading_type: "cbg".to_string(),
            time: time.to_string(),
            device_time: None,
            value: 112.0,
            id: Some("r1".to_string()),
            device_id: Some("DexG4Rec_XXXXXXXXX".to_string()),
            annotations: Vec::new(),
        }
    }

    #[test]
    fn test_ms_from_midnight_in_utc() {
        let rec = normalize(&raw("2014-03-06T00:00:00.001Z"), Tz::UTC).unwrap();
        assert_eq!(rec.ms_since_local_midnight, 1);
        assert_eq!(rec.local_date, NaiveDate::from_ymd_opt(2014, 3, 6).unwrap());
        assert_eq!(rec.weekday, Weekday::Thursday);
    }

    #[test]
    fn test_ms_from_midnight_localized_pacific() {
        // Same local wall clock (00:00:00.001) as the UTC case once the
        // 8-hour standard offset is applied.
        let rec = normalize(&raw("2014-03-06T08:00:00.001Z"), Tz::US__Pacific).unwrap();
        assert_eq!(rec.ms_since_local_midnight, 1);
        assert_eq!(rec.local_date, NaiveDate::from_ymd_opt(2014, 3, 6).unwrap());
    }

    #[test]
    fn test_dst_fall_back_day_stays_in_range() {
        // 2014-11-02 was a 25-hour day in US/Pacific. 07:25Z lands on
        // 23:25 PST that evening; the wall-clock projection must not
        // exceed the nominal day length.
        let rec = normalize(&raw("2014-11-03T07:25:00.000Z"), Tz::US__Pacific).unwrap();
        assert_eq!(rec.ms_since_local_midnight, 84_300_000);
        assert!(rec.ms_since_local_midnight < MS_PER_DAY);
        assert_eq!(rec.local_date, NaiveDate::from_ymd_opt(2014, 11, 2).unwrap());
        assert_eq!(rec.weekday, Weekday::Sunday);
    }

    #[test]
    fn test_dst_spring_forward_day() {
        // 2014-03-09 02:00 PST -> 03:00 PDT; 10:05Z is 03:05 PDT.
        let rec = normalize(&raw("2014-03-09T10:05:00.000Z"), Tz::US__Pacific).unwrap();
        assert_eq!(rec.ms_since_local_midnight, 3 * 3_600_000 + 5 * 60_000);
        assert_eq!(rec.local_date, NaiveDate::from_ymd_opt(2014, 3, 9).unwrap());
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let input = raw("2014-11-03T07:25:00.000Z");
        let first = normalize(&input, Tz::US__Pacific).unwrap();
        let second = normalize(&input, Tz::US__Pacific).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_timestamp_rejected() {
        let err = normalize(&raw("not-a-timestamp"), Tz::UTC).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidTimestamp { .. }));
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let mut input = raw("2014-03-06T00:00:00.000Z");
        input.reading_type = "bolus".to_string();
        let err = normalize(&input, Tz::UTC).unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedType { .. }));
    }

    #[test]
    fn test_missing_id_gets_generated() {
        let mut input = raw("2014-03-06T00:00:00.000Z");
        input.id = None;
        let rec = normalize(&input, Tz::UTC).unwrap();
        assert!(!rec.id.is_empty());
    }

    #[test]
    fn test_resolve_timezone() {
        let prefs = TimePrefs {
            timezone_aware: true,
            timezone_name: Some("US/Pacific".to_string()),
        };
        assert_eq!(resolve_timezone(&prefs).unwrap(), Tz::US__Pacific);

        let naive = TimePrefs::default();
        assert_eq!(resolve_timezone(&naive).unwrap(), Tz::UTC);

        let aware_unnamed = TimePrefs {
            timezone_aware: true,
            timezone_name: None,
        };
        assert_eq!(resolve_timezone(&aware_unnamed).unwrap(), Tz::UTC);

        let bogus = TimePrefs {
            timezone_aware: true,
            timezone_name: Some("Mars/Olympus".to_string()),
        };
        assert!(matches!(
            resolve_timezone(&bogus).unwrap_err(),
            NormalizeError::UnknownTimezone { .. }
        ));
    }
}
