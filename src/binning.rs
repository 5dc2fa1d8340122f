//! Glucose classification and time-of-day bin statistics
//!
//! Buckets readings into fixed-width bins across the 24-hour local day and
//! computes per-bin order statistics, with different minimum-sample policies
//! for continuous vs. self-monitored sources.

use std::collections::HashMap;

use crate::error::{BinError, ClassifyError};
use crate::models::{
    BinStatistics, BgBounds, MarkerKind, NormalizedRecord, OutOfRangeMarker, RangeBoundaries,
    ReadingType, MS_PER_DAY,
};

/// Outer quantiles used for the continuous whisker band
pub const DEFAULT_OUTER_QUANTILES: [f64; 2] = [0.1, 0.9];

/// Default bin width (30 minutes)
pub const DEFAULT_BIN_WIDTH_MS: i64 = 1_800_000;

/// Minimum self-monitored samples before a median is reported
const SMBG_MIN_FOR_MEDIAN: usize = 3;

/// Minimum self-monitored samples before quartiles are reported
const SMBG_MIN_FOR_QUARTILES: usize = 5;

/// Classification category for a glucose value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    VeryLow,
    Low,
    Target,
    High,
    VeryHigh,
}

/// Three-way or five-way classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationMode {
    ThreeWay,
    FiveWay,
}

fn require_finite(name: &str, value: f64) -> Result<f64, ClassifyError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ClassifyError::InvalidBounds {
            reason: format!("{name} is not a finite number"),
        })
    }
}

/// Classify a glucose value against configurable boundaries.
///
/// Boundary ties are asymmetric and deliberate: a value exactly at either
/// target bound is `Target`, a value exactly at `very_low_threshold` is
/// `Low`, and a value exactly at `very_high_threshold` is `High`.
pub fn classify(
    bounds: &BgBounds,
    value: f64,
    mode: ClassificationMode,
) -> Result<Category, ClassifyError> {
    let lower = require_finite("targetLowerBound", bounds.target_lower_bound)?;
    let upper = require_finite("targetUpperBound", bounds.target_upper_bound)?;

    if !value.is_finite() || value <= 0.0 {
        return Err(ClassifyError::InvalidValue { value });
    }

    match mode {
        ClassificationMode::ThreeWay => {
            if value < lower {
                Ok(Category::Low)
            } else if value > upper {
                Ok(Category::High)
            } else {
                Ok(Category::Target)
            }
        }
        ClassificationMode::FiveWay => {
            let very_low = require_finite(
                "veryLowThreshold",
                bounds
                    .very_low_threshold
                    .ok_or_else(|| ClassifyError::InvalidBounds {
                        reason: "veryLowThreshold required for five-way classification"
                            .to_string(),
                    })?,
            )?;
            let very_high = require_finite(
                "veryHighThreshold",
                bounds
                    .very_high_threshold
                    .ok_or_else(|| ClassifyError::InvalidBounds {
                        reason: "veryHighThreshold required for five-way classification"
                            .to_string(),
                    })?,
            )?;

            if value < very_low {
                Ok(Category::VeryLow)
            } else if value < lower {
                Ok(Category::Low)
            } else if value <= upper {
                Ok(Category::Target)
            } else if value <= very_high {
                Ok(Category::High)
            } else {
                Ok(Category::VeryHigh)
            }
        }
    }
}

fn validate_bin_width(bin_width_ms: i64) -> Result<(), BinError> {
    if bin_width_ms <= 0 || bin_width_ms > MS_PER_DAY || MS_PER_DAY % bin_width_ms != 0 {
        return Err(BinError::InvalidBinWidth {
            width: bin_width_ms,
        });
    }
    Ok(())
}

/// Bin key (bin midpoint in ms) for a time of day.
///
/// The key space for a width `w` is `[w/2, 86_400_000)` stepped by `w`.
pub fn bin_key(bin_width_ms: i64, ms_since_local_midnight: i64) -> Result<i64, BinError> {
    validate_bin_width(bin_width_ms)?;
    if !(0..MS_PER_DAY).contains(&ms_since_local_midnight) {
        return Err(BinError::OutOfRange {
            ms: ms_since_local_midnight,
        });
    }
    Ok(ms_since_local_midnight / bin_width_ms * bin_width_ms + bin_width_ms / 2)
}

/// The exhaustive, ordered bin-key space for a given width
pub fn bin_key_space(bin_width_ms: i64) -> Result<Vec<i64>, BinError> {
    validate_bin_width(bin_width_ms)?;
    Ok((0..MS_PER_DAY / bin_width_ms)
        .map(|i| i * bin_width_ms + bin_width_ms / 2)
        .collect())
}

/// Quantile of an ascending-sorted slice, by linear interpolation between
/// order statistics. `None` on an empty slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let position = q * (sorted.len() - 1) as f64;
    let below = position.floor() as usize;
    let fraction = position - below as f64;
    if below + 1 < sorted.len() {
        Some(sorted[below] + fraction * (sorted[below + 1] - sorted[below]))
    } else {
        Some(sorted[below])
    }
}

/// Conservative aggregation of device-reported out-of-range thresholds:
/// the maximum of the low thresholds and the minimum of the high ones, so
/// disagreement between sources flags more values as out-of-range.
pub fn determine_range_boundaries(markers: &[OutOfRangeMarker]) -> RangeBoundaries {
    let mut boundaries = RangeBoundaries::default();
    for marker in markers {
        match marker.value {
            MarkerKind::Low => {
                boundaries.low = Some(match boundaries.low {
                    Some(current) => current.max(marker.threshold),
                    None => marker.threshold,
                });
            }
            MarkerKind::High => {
                boundaries.high = Some(match boundaries.high {
                    Some(current) => current.min(marker.threshold),
                    None => marker.threshold,
                });
            }
        }
    }
    boundaries
}

/// Descriptive statistics for a single bin.
///
/// Continuous bins always report the full quantile band; self-monitored bins
/// suppress the median below 3 samples and both quartiles below 5, because
/// quantile estimates are unreliable at those counts.
pub fn stats_for_bin(
    kind: ReadingType,
    key: i64,
    bin_width_ms: i64,
    values: &[f64],
    markers: &[OutOfRangeMarker],
    outer_quantiles: [f64; 2],
) -> BinStatistics {
    let mut bin = BinStatistics::empty(key, bin_width_ms);

    if values.is_empty() {
        return bin;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    bin.min = sorted.first().copied();
    bin.max = sorted.last().copied();

    match kind {
        ReadingType::Cbg => {
            bin.lower_quantile = quantile(&sorted, outer_quantiles[0]);
            bin.first_quartile = quantile(&sorted, 0.25);
            bin.median = quantile(&sorted, 0.5);
            bin.third_quartile = quantile(&sorted, 0.75);
            bin.upper_quantile = quantile(&sorted, outer_quantiles[1]);
        }
        ReadingType::Smbg => {
            bin.mean = Some(sorted.iter().sum::<f64>() / sorted.len() as f64);
            if sorted.len() >= SMBG_MIN_FOR_MEDIAN {
                bin.median = quantile(&sorted, 0.5);
            }
            if sorted.len() >= SMBG_MIN_FOR_QUARTILES {
                bin.first_quartile = quantile(&sorted, 0.25);
                bin.third_quartile = quantile(&sorted, 0.75);
            }
        }
    }

    if !markers.is_empty() {
        bin.out_of_range = Some(determine_range_boundaries(markers));
    }

    bin
}

/// Bin a record set across the 24-hour cycle and compute statistics for the
/// *entire* key space, so the result is a fixed-length, densely-keyed array
/// regardless of sparsity.
pub fn munge_bins(
    kind: ReadingType,
    bin_width_ms: i64,
    records: &[NormalizedRecord],
    outer_quantiles: [f64; 2],
) -> Result<Vec<BinStatistics>, BinError> {
    let keys = bin_key_space(bin_width_ms)?;

    let mut grouped: HashMap<i64, (Vec<f64>, Vec<OutOfRangeMarker>)> = HashMap::new();
    for record in records {
        let key = bin_key(bin_width_ms, record.ms_since_local_midnight)?;
        let entry = grouped.entry(key).or_default();
        entry.0.push(record.value);
        entry.1.extend(record.annotations.iter().cloned());
    }

    tracing::debug!(
        kind = %kind,
        bin_width_ms,
        records = records.len(),
        populated_bins = grouped.len(),
        total_bins = keys.len(),
        "binned records"
    );

    Ok(keys
        .into_iter()
        .map(|key| {
            let (values, markers) = grouped
                .get(&key)
                .map(|(v, m)| (v.as_slice(), m.as_slice()))
                .unwrap_or((&[], &[]));
            stats_for_bin(kind, key, bin_width_ms, values, markers, outer_quantiles)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Weekday;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn bounds() -> BgBounds {
        BgBounds {
            very_low_threshold: Some(55.0),
            target_lower_bound: 70.0,
            target_upper_bound: 180.0,
            very_high_threshold: Some(300.0),
        }
    }

    fn record(ms: i64, value: f64) -> NormalizedRecord {
        NormalizedRecord {
            id: format!("r{ms}"),
            reading_type: ReadingType::Cbg,
            value,
            utc_instant: 1_400_000_000_000 + ms,
            local_date: NaiveDate::from_ymd_opt(2014, 5, 13).unwrap(),
            weekday: Weekday::Tuesday,
            ms_since_local_midnight: ms,
            device_id: None,
            annotations: Vec::new(),
        }
    }

    #[test]
    fn test_three_way_classification() {
        let b = bounds();
        assert_eq!(
            classify(&b, 69.9, ClassificationMode::ThreeWay).unwrap(),
            Category::Low
        );
        assert_eq!(
            classify(&b, 70.0, ClassificationMode::ThreeWay).unwrap(),
            Category::Target
        );
        assert_eq!(
            classify(&b, 180.0, ClassificationMode::ThreeWay).unwrap(),
            Category::Target
        );
        assert_eq!(
            classify(&b, 180.1, ClassificationMode::ThreeWay).unwrap(),
            Category::High
        );
    }

    #[test]
    fn test_five_way_tie_breaks() {
        let b = bounds();
        // The boundary value itself classifies into the inner category.
        assert_eq!(
            classify(&b, 55.0, ClassificationMode::FiveWay).unwrap(),
            Category::Low
        );
        assert_eq!(
            classify(&b, 54.9, ClassificationMode::FiveWay).unwrap(),
            Category::VeryLow
        );
        assert_eq!(
            classify(&b, 300.0, ClassificationMode::FiveWay).unwrap(),
            Category::High
        );
        assert_eq!(
            classify(&b, 301.0, ClassificationMode::FiveWay).unwrap(),
            Category::VeryHigh
        );
        assert_eq!(
            classify(&b, 70.0, ClassificationMode::FiveWay).unwrap(),
            Category::Target
        );
        assert_eq!(
            classify(&b, 180.0, ClassificationMode::FiveWay).unwrap(),
            Category::Target
        );
    }

    #[test]
    fn test_classification_input_validation() {
        let b = bounds();
        assert!(matches!(
            classify(&b, 0.0, ClassificationMode::ThreeWay).unwrap_err(),
            ClassifyError::InvalidValue { .. }
        ));
        assert!(matches!(
            classify(&b, f64::NAN, ClassificationMode::ThreeWay).unwrap_err(),
            ClassifyError::InvalidValue { .. }
        ));

        let missing_outer = BgBounds {
            very_low_threshold: None,
            very_high_threshold: None,
            ..bounds()
        };
        // Three-way does not need the outer thresholds...
        assert!(classify(&missing_outer, 100.0, ClassificationMode::ThreeWay).is_ok());
        // ...but five-way does.
        assert!(matches!(
            classify(&missing_outer, 100.0, ClassificationMode::FiveWay).unwrap_err(),
            ClassifyError::InvalidBounds { .. }
        ));

        let non_finite = BgBounds {
            target_lower_bound: f64::NAN,
            ..bounds()
        };
        assert!(matches!(
            classify(&non_finite, 100.0, ClassificationMode::ThreeWay).unwrap_err(),
            ClassifyError::InvalidBounds { .. }
        ));
    }

    #[test]
    fn test_bin_key_formula() {
        assert_eq!(bin_key(3_600_000, 0).unwrap().to_string(), "1800000");
        assert_eq!(bin_key(3_600_000, 3_599_999).unwrap().to_string(), "1800000");
        assert_eq!(bin_key(3_600_000, 3_600_000).unwrap().to_string(), "5400000");
    }

    #[test]
    fn test_bin_key_range_validation() {
        assert!(matches!(
            bin_key(3_600_000, -1).unwrap_err(),
            BinError::OutOfRange { .. }
        ));
        assert!(matches!(
            bin_key(3_600_000, MS_PER_DAY).unwrap_err(),
            BinError::OutOfRange { .. }
        ));
        assert!(matches!(
            bin_key(0, 1).unwrap_err(),
            BinError::InvalidBinWidth { .. }
        ));
        assert!(matches!(
            bin_key(7_000_000, 1).unwrap_err(),
            BinError::InvalidBinWidth { .. }
        ));
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        assert_eq!(quantile(&values, 0.5), Some(2.5));
        assert_eq!(quantile(&values, 0.25), Some(1.75));
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[42.0], 0.9), Some(42.0));
    }

    #[test]
    fn test_conservative_threshold_aggregation() {
        let markers = vec![
            OutOfRangeMarker {
                code: "bg/out-of-range".to_string(),
                value: MarkerKind::Low,
                threshold: 20.0,
            },
            OutOfRangeMarker {
                code: "bg/out-of-range".to_string(),
                value: MarkerKind::Low,
                threshold: 25.0,
            },
            OutOfRangeMarker {
                code: "bg/out-of-range".to_string(),
                value: MarkerKind::Low,
                threshold: 15.0,
            },
            OutOfRangeMarker {
                code: "bg/out-of-range".to_string(),
                value: MarkerKind::High,
                threshold: 650.0,
            },
            OutOfRangeMarker {
                code: "bg/out-of-range".to_string(),
                value: MarkerKind::High,
                threshold: 500.0,
            },
        ];
        let b = determine_range_boundaries(&markers);
        assert_eq!(b.low, Some(25.0));
        assert_eq!(b.high, Some(500.0));

        let empty = determine_range_boundaries(&[]);
        assert_eq!(empty.low, None);
        assert_eq!(empty.high, None);
    }

    #[test]
    fn test_smbg_sample_size_gating() {
        let gated = |values: &[f64]| {
            stats_for_bin(
                ReadingType::Smbg,
                900_000,
                1_800_000,
                values,
                &[],
                DEFAULT_OUTER_QUANTILES,
            )
        };

        let two = gated(&[100.0, 120.0]);
        assert!(two.median.is_none());
        assert!(two.mean.is_some());

        let four = gated(&[100.0, 110.0, 120.0, 130.0]);
        assert!(four.median.is_some());
        assert!(four.first_quartile.is_none());
        assert!(four.third_quartile.is_none());

        let five = gated(&[100.0, 110.0, 120.0, 130.0, 140.0]);
        assert_eq!(five.median, Some(120.0));
        assert_eq!(five.first_quartile, Some(110.0));
        assert_eq!(five.third_quartile, Some(130.0));
    }

    #[test]
    fn test_cbg_quantiles_always_computed() {
        let bin = stats_for_bin(
            ReadingType::Cbg,
            900_000,
            1_800_000,
            &[100.0, 120.0],
            &[],
            DEFAULT_OUTER_QUANTILES,
        );
        assert!(bin.median.is_some());
        assert!(bin.first_quartile.is_some());
        assert!(bin.lower_quantile.is_some());
        assert!(bin.upper_quantile.is_some());
        // Means belong to the self-monitored presentation only.
        assert!(bin.mean.is_none());
    }

    #[test]
    fn test_stats_for_empty_bin() {
        let bin = stats_for_bin(
            ReadingType::Cbg,
            1_800_000,
            3_600_000,
            &[],
            &[],
            DEFAULT_OUTER_QUANTILES,
        );
        assert_eq!(bin.id, "1800000");
        assert_eq!(bin.ms_from, 0);
        assert_eq!(bin.ms_to, 3_600_000);
        assert!(bin.min.is_none());
        assert!(bin.max.is_none());
        assert!(bin.out_of_range.is_none());
    }

    #[test]
    fn test_bin_out_of_range_thresholds() {
        let markers = [OutOfRangeMarker {
            code: "bg/out-of-range".to_string(),
            value: MarkerKind::High,
            threshold: 400.0,
        }];
        let bin = stats_for_bin(
            ReadingType::Cbg,
            900_000,
            1_800_000,
            &[401.0],
            &markers,
            DEFAULT_OUTER_QUANTILES,
        );
        assert_eq!(bin.out_of_range.unwrap().high, Some(400.0));
    }

    #[test]
    fn test_munge_bins_exhaustive_hourly() {
        // Two sparse records must still produce all 24 hourly bins.
        let records = vec![record(0, 100.0), record(3_600_000, 140.0)];
        let bins =
            munge_bins(ReadingType::Cbg, 3_600_000, &records, DEFAULT_OUTER_QUANTILES).unwrap();
        assert_eq!(bins.len(), 24);
        assert_eq!(bins[0].id, "1800000");
        assert_eq!(bins[0].min, Some(100.0));
        assert_eq!(bins[1].min, Some(140.0));
        for bin in &bins[2..] {
            assert!(bin.min.is_none());
            assert!(bin.median.is_none());
        }
        assert_eq!(bins[23].id, (23 * 3_600_000 + 1_800_000).to_string());
    }

    #[test]
    fn test_munge_bins_empty_input() {
        let bins = munge_bins(ReadingType::Smbg, 1_800_000, &[], DEFAULT_OUTER_QUANTILES).unwrap();
        assert_eq!(bins.len(), 48);
        assert!(bins.iter().all(|b| b.min.is_none()));
    }

    proptest! {
        #[test]
        fn prop_quantile_bounded_and_monotone(
            mut values in proptest::collection::vec(40.0f64..400.0, 1..64),
            q1 in 0.0f64..=1.0,
            q2 in 0.0f64..=1.0,
        ) {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let lo = *values.first().unwrap();
            let hi = *values.last().unwrap();
            let (qa, qb) = if q1 <= q2 { (q1, q2) } else { (q2, q1) };
            let va = quantile(&values, qa).unwrap();
            let vb = quantile(&values, qb).unwrap();
            prop_assert!(va >= lo && va <= hi);
            prop_assert!(vb >= lo && vb <= hi);
            prop_assert!(va <= vb);
        }

        #[test]
        fn prop_bin_key_lands_in_key_space(ms in 0i64..MS_PER_DAY) {
            for width in [300_000i64, 1_800_000, 3_600_000] {
                let key = bin_key(width, ms).unwrap();
                let space = bin_key_space(width).unwrap();
                prop_assert!(space.contains(&key));
                prop_assert!(ms >= key - width / 2 && ms < key + width / 2);
            }
        }
    }
}
