//! Temporal index over normalized records
//!
//! One index per reading type. A backing arena of records carries two views
//! kept in sync by construction: a date-sorted view for range pruning and a
//! weekday view for day-of-week toggles. Filters only change visibility,
//! never membership.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::models::{ActiveWeekdays, NormalizedRecord, Weekday};

/// Active date-range filter state
#[derive(Debug, Clone, Copy, PartialEq)]
enum DateFilter {
    /// No date filter; all dates visible
    Unbounded,
    /// Visible window over UTC instants, start inclusive, end exclusive.
    /// The date bounds are a conservative local-date superset used to prune
    /// the date view before the exact instant comparison.
    Window {
        start_ms: i64,
        end_ms: i64,
        first_date: NaiveDate,
        last_date: NaiveDate,
    },
    /// Degenerate window (inverted or unparseable bounds); nothing visible
    Empty,
}

/// In-memory dual-view index for one reading type
#[derive(Debug)]
pub struct TemporalIndex {
    records: Vec<NormalizedRecord>,
    by_date: BTreeMap<NaiveDate, Vec<usize>>,
    by_weekday: [Vec<usize>; 7],
    date_filter: Option<DateFilter>,
    weekday_filter: Option<ActiveWeekdays>,
}

impl Default for TemporalIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalIndex {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            by_date: BTreeMap::new(),
            by_weekday: std::array::from_fn(|_| Vec::new()),
            date_filter: None,
            weekday_filter: None,
        }
    }

    /// Append a batch of records, updating both views. O(batch size).
    pub fn ingest(&mut self, records: Vec<NormalizedRecord>) {
        self.records.reserve(records.len());
        for record in records {
            let idx = self.records.len();
            self.by_date
                .entry(record.local_date)
                .or_default()
                .push(idx);
            self.by_weekday[record.weekday.index()].push(idx);
            self.records.push(record);
        }
    }

    /// Replace the active date filter. Idempotent: reapplying the same range
    /// yields the same visible set.
    ///
    /// Bounds are RFC 3339 instants. An inverted (start after end) or
    /// unparseable range yields an empty view rather than an error; "no
    /// data" is the safe default for a degenerate window.
    pub fn filter_by_date_range(&mut self, start: &str, end: &str) {
        let parsed = match (parse_instant(start), parse_instant(end)) {
            (Some(s), Some(e)) if s <= e => DateFilter::Window {
                start_ms: s.timestamp_millis(),
                end_ms: e.timestamp_millis(),
                // Local dates can differ from the UTC calendar by up to one
                // day in either direction across IANA offsets.
                first_date: s.date_naive() - Duration::days(1),
                last_date: e.date_naive() + Duration::days(1),
            },
            (Some(_), Some(_)) => {
                tracing::debug!(start, end, "inverted date range, filtering to empty view");
                DateFilter::Empty
            }
            _ => {
                tracing::warn!(start, end, "unparseable date range, filtering to empty view");
                DateFilter::Empty
            }
        };
        self.date_filter = Some(parsed);
    }

    /// Replace the active weekday filter. Idempotent.
    pub fn filter_by_weekdays(&mut self, days: ActiveWeekdays) {
        self.weekday_filter = Some(days);
    }

    /// Restore full visibility on both views. Membership is untouched.
    pub fn clear_filters(&mut self) {
        self.date_filter = None;
        self.weekday_filter = None;
    }

    /// Discard all records and filters (subject switch).
    pub fn reset(&mut self) {
        self.records.clear();
        self.by_date.clear();
        for bucket in &mut self.by_weekday {
            bucket.clear();
        }
        self.date_filter = None;
        self.weekday_filter = None;
    }

    /// All currently-visible records (AND of both active filters), ordered
    /// most-recent-first.
    pub fn current_view(&self) -> Vec<NormalizedRecord> {
        let weekday_ok = |record: &NormalizedRecord| {
            self.weekday_filter
                .map_or(true, |days| days.is_active(record.weekday))
        };

        let mut indices: Vec<usize> = match self.date_filter {
            Some(DateFilter::Empty) => Vec::new(),
            Some(DateFilter::Window {
                start_ms,
                end_ms,
                first_date,
                last_date,
            }) => self
                .by_date
                .range(first_date..=last_date)
                .flat_map(|(_, bucket)| bucket.iter().copied())
                .filter(|&i| {
                    let record = &self.records[i];
                    record.utc_instant >= start_ms
                        && record.utc_instant < end_ms
                        && weekday_ok(record)
                })
                .collect(),
            Some(DateFilter::Unbounded) | None => match self.weekday_filter {
                Some(days) => Weekday::ALL
                    .iter()
                    .filter(|day| days.is_active(**day))
                    .flat_map(|day| self.by_weekday[day.index()].iter().copied())
                    .collect(),
                None => (0..self.records.len()).collect(),
            },
        };

        indices.sort_unstable_by_key(|&i| std::cmp::Reverse((self.records[i].utc_instant, i)));
        indices
            .into_iter()
            .map(|i| self.records[i].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Calendar span covered by the stored records
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = *self.by_date.keys().next()?;
        let last = *self.by_date.keys().next_back()?;
        Some((first, last))
    }
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
