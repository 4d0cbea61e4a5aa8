use std::collections::BTreeMap;

use chrono::Timelike;

use crate::model::{
    AnalysisResult, AnalyzeError, CurrentGlucose, CvStatus, DateRange, GlucoseStats, Reading,
    TimeInRange,
};
use crate::units::{Thresholds, Unit, round1};

/// Coefficient of variation below this percentage counts as stable.
const CV_STABLE_BELOW: f64 = 36.0;

// GMI regression constants (Bergenstal et al., published formula).
const GMI_INTERCEPT: f64 = 3.31;
const GMI_SLOPE: f64 = 0.02392;

/// Trait defining the interface for the glucose analyzer.
pub trait Analyzer {
    fn calculate_stats(
        &self,
        readings: &[Reading],
        unit: Unit,
    ) -> Result<GlucoseStats, AnalyzeError>;

    fn analyze(
        &self,
        readings: &[Reading],
        days: i64,
        thresholds: &Thresholds,
        unit: Unit,
    ) -> Result<AnalysisResult, AnalyzeError>;

    fn current(
        &self,
        readings: &[Reading],
        thresholds: &Thresholds,
        unit: Unit,
    ) -> Result<CurrentGlucose, AnalyzeError>;
}

pub struct GlucoseAnalyzer;

impl GlucoseAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GlucoseAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimated A1C from mean glucose in mg/dL.
fn gmi(mean_mg_dl: f64) -> f64 {
    round1(GMI_INTERCEPT + GMI_SLOPE * mean_mg_dl)
}

/// Coefficient of variation as a percentage. Callers must reject a zero mean
/// before calling.
fn coefficient_of_variation(mean: f64, std: f64) -> f64 {
    round1(std / mean * 100.0)
}

fn mean_of(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_of(values: &[f64], mean: f64) -> f64 {
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Median of a sorted slice: the midpoint, or the average of the two middle
/// values for even counts.
fn median_of_sorted(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Bucket percentages, unrounded. Because the buckets partition the glucose
/// axis the results sum to exactly 100 for any non-empty input.
pub fn time_in_range(readings: &[Reading], thresholds: &Thresholds) -> TimeInRange {
    use crate::units::GlucoseStatus::*;

    let n = readings.len() as f64;
    let mut counts = [0usize; 5];
    for reading in readings {
        let bucket = match thresholds.status(reading.glucose_mg_dl) {
            VeryLow => 0,
            Low => 1,
            InRange => 2,
            High => 3,
            VeryHigh => 4,
        };
        counts[bucket] += 1;
    }

    let pct = |c: usize| c as f64 / n * 100.0;
    TimeInRange {
        very_low_pct: pct(counts[0]),
        low_pct: pct(counts[1]),
        in_range_pct: pct(counts[2]),
        high_pct: pct(counts[3]),
        very_high_pct: pct(counts[4]),
    }
}

impl TimeInRange {
    fn rounded(self) -> TimeInRange {
        TimeInRange {
            very_low_pct: round1(self.very_low_pct),
            low_pct: round1(self.low_pct),
            in_range_pct: round1(self.in_range_pct),
            high_pct: round1(self.high_pct),
            very_high_pct: round1(self.very_high_pct),
        }
    }
}

impl Analyzer for GlucoseAnalyzer {
    /// Basic descriptive statistics over the readings, in the display unit.
    fn calculate_stats(
        &self,
        readings: &[Reading],
        unit: Unit,
    ) -> Result<GlucoseStats, AnalyzeError> {
        if readings.is_empty() {
            return Err(AnalyzeError::EmptyDataset);
        }

        let mut values: Vec<f64> = readings.iter().map(|r| r.glucose_mg_dl as f64).collect();
        values.sort_by(|a, b| a.total_cmp(b));

        let mean = mean_of(&values);
        let std = std_of(&values, mean);
        let median = median_of_sorted(&values);

        Ok(GlucoseStats {
            count: values.len(),
            mean: unit.convert(round1(mean)),
            std: unit.convert(round1(std)),
            min: unit.convert(values[0]),
            max: unit.convert(values[values.len() - 1]),
            median: unit.convert(round1(median)),
            unit: unit.label().to_string(),
        })
    }

    /// Full analysis: stats, time-in-range, GMI, CV, and hourly averages.
    /// GMI and CV always use the raw mg/dL mean and standard deviation,
    /// regardless of the display unit.
    fn analyze(
        &self,
        readings: &[Reading],
        days: i64,
        thresholds: &Thresholds,
        unit: Unit,
    ) -> Result<AnalysisResult, AnalyzeError> {
        if readings.is_empty() {
            return Err(AnalyzeError::EmptyDataset);
        }

        let values: Vec<f64> = readings.iter().map(|r| r.glucose_mg_dl as f64).collect();
        let raw_mean = mean_of(&values);
        if raw_mean == 0.0 {
            return Err(AnalyzeError::InvalidData);
        }
        let raw_std = std_of(&values, raw_mean);

        let statistics = self.calculate_stats(readings, unit)?;
        let tir = time_in_range(readings, thresholds).rounded();

        let cv = coefficient_of_variation(raw_mean, raw_std);
        let cv_status = if cv < CV_STABLE_BELOW {
            CvStatus::Stable
        } else {
            CvStatus::Unstable
        };

        let mut hourly: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        for reading in readings {
            hourly
                .entry(reading.timestamp.hour())
                .or_default()
                .push(reading.glucose_mg_dl as f64);
        }
        let hourly_averages = hourly
            .into_iter()
            .map(|(hour, values)| (hour, unit.convert(mean_of(&values).round())))
            .collect();

        let from = readings.iter().map(|r| r.timestamp).min();
        let to = readings.iter().map(|r| r.timestamp).max();

        Ok(AnalysisResult {
            date_range: DateRange {
                from: from.map(|t| t.format("%Y-%m-%d").to_string()).unwrap_or_default(),
                to: to.map(|t| t.format("%Y-%m-%d").to_string()).unwrap_or_default(),
                days_analyzed: days,
            },
            reading_count: readings.len(),
            statistics,
            time_in_range: tir,
            gmi_estimated_a1c: gmi(raw_mean),
            cv_variability: cv,
            cv_status,
            hourly_averages,
            unit: unit.label().to_string(),
        })
    }

    /// The most recent reading with its trend and status label. Among
    /// readings sharing a timestamp the last one in input order wins.
    fn current(
        &self,
        readings: &[Reading],
        thresholds: &Thresholds,
        unit: Unit,
    ) -> Result<CurrentGlucose, AnalyzeError> {
        let latest = readings
            .iter()
            .reduce(|best, r| if r.timestamp >= best.timestamp { r } else { best })
            .ok_or(AnalyzeError::NoData)?;

        Ok(CurrentGlucose {
            glucose: unit.convert(latest.glucose_mg_dl as f64),
            unit: unit.label().to_string(),
            trend: latest.trend,
            timestamp: latest.timestamp,
            status: thresholds.status(latest.glucose_mg_dl).label().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Trend;
    use chrono::DateTime;

    fn reading(ts_ms: i64, sgv: i32) -> Reading {
        Reading {
            timestamp: DateTime::from_timestamp_millis(ts_ms).unwrap(),
            glucose_mg_dl: sgv,
            trend: Trend::Flat,
        }
    }

    fn readings(sgvs: &[i32]) -> Vec<Reading> {
        sgvs.iter()
            .enumerate()
            .map(|(i, &sgv)| reading(i as i64 * 300_000, sgv))
            .collect()
    }

    #[test]
    fn median_averages_two_midpoints() {
        let analyzer = GlucoseAnalyzer::new();
        let stats = analyzer
            .calculate_stats(&readings(&[70, 180]), Unit::MgDl)
            .unwrap();
        assert_eq!(stats.median, 125.0);

        let stats = analyzer
            .calculate_stats(&readings(&[70, 100, 180]), Unit::MgDl)
            .unwrap();
        assert_eq!(stats.median, 100.0);
    }

    #[test]
    fn stats_min_max_mean() {
        let analyzer = GlucoseAnalyzer::new();
        let stats = analyzer
            .calculate_stats(&readings(&[90, 110, 100]), Unit::MgDl)
            .unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 90.0);
        assert_eq!(stats.max, 110.0);
        assert_eq!(stats.mean, 100.0);
        assert_eq!(stats.unit, "mg/dL");
    }

    #[test]
    fn gmi_matches_published_formula() {
        // mean of 138 and 139 is 138.5
        assert_eq!(gmi(138.5), 6.6);
        let analyzer = GlucoseAnalyzer::new();
        let result = analyzer
            .analyze(&readings(&[138, 139]), 90, &Thresholds::default(), Unit::MgDl)
            .unwrap();
        assert_eq!(result.gmi_estimated_a1c, 6.6);
    }

    #[test]
    fn cv_classification() {
        let cv = coefficient_of_variation(138.5, 42.1);
        assert_eq!(cv, 30.4);
        assert!(cv < CV_STABLE_BELOW);
    }

    #[test]
    fn cv_status_on_flat_series_is_stable() {
        let analyzer = GlucoseAnalyzer::new();
        let result = analyzer
            .analyze(
                &readings(&[100, 100, 100, 100]),
                90,
                &Thresholds::default(),
                Unit::MgDl,
            )
            .unwrap();
        assert_eq!(result.cv_variability, 0.0);
        assert_eq!(result.cv_status, CvStatus::Stable);
    }

    #[test]
    fn cv_status_on_volatile_series_is_unstable() {
        let analyzer = GlucoseAnalyzer::new();
        // mean 150, std 110 -> CV 73.3
        let result = analyzer
            .analyze(&readings(&[40, 260]), 90, &Thresholds::default(), Unit::MgDl)
            .unwrap();
        assert_eq!(result.cv_status, CvStatus::Unstable);
    }

    #[test]
    fn time_in_range_partitions_to_100() {
        let set = readings(&[53, 54, 69, 70, 180, 181, 250, 251]);
        let tir = time_in_range(&set, &Thresholds::default());
        let sum =
            tir.very_low_pct + tir.low_pct + tir.in_range_pct + tir.high_pct + tir.very_high_pct;
        assert!((sum - 100.0).abs() < 0.1);
        assert_eq!(tir.very_low_pct, 12.5);
        assert_eq!(tir.low_pct, 25.0);
        assert_eq!(tir.in_range_pct, 25.0);
        assert_eq!(tir.high_pct, 25.0);
        assert_eq!(tir.very_high_pct, 12.5);
    }

    #[test]
    fn time_in_range_raw_sum_is_exact_for_awkward_counts() {
        // 3 readings: percentages are repeating decimals, raw sum still 100
        let set = readings(&[60, 100, 300]);
        let tir = time_in_range(&set, &Thresholds::default());
        let sum =
            tir.very_low_pct + tir.low_pct + tir.in_range_pct + tir.high_pct + tir.very_high_pct;
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn analyze_empty_fails_with_empty_dataset() {
        let analyzer = GlucoseAnalyzer::new();
        let err = analyzer
            .analyze(&[], 90, &Thresholds::default(), Unit::MgDl)
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::EmptyDataset));
    }

    #[test]
    fn analyze_zero_mean_fails_with_invalid_data() {
        let analyzer = GlucoseAnalyzer::new();
        let set = vec![reading(0, 0), reading(300_000, 0)];
        let err = analyzer
            .analyze(&set, 90, &Thresholds::default(), Unit::MgDl)
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::InvalidData));
    }

    #[test]
    fn current_empty_fails_with_no_data() {
        let analyzer = GlucoseAnalyzer::new();
        let err = analyzer
            .current(&[], &Thresholds::default(), Unit::MgDl)
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::NoData));
    }

    #[test]
    fn current_picks_latest_reading() {
        let analyzer = GlucoseAnalyzer::new();
        let set = vec![reading(1000, 100), reading(3000, 140), reading(2000, 120)];
        let current = analyzer
            .current(&set, &Thresholds::default(), Unit::MgDl)
            .unwrap();
        assert_eq!(current.glucose, 140.0);
        assert_eq!(current.status, "in range");
    }

    #[test]
    fn current_tie_break_prefers_last_in_input_order() {
        let analyzer = GlucoseAnalyzer::new();
        let set = vec![reading(5000, 100), reading(5000, 200)];
        let current = analyzer
            .current(&set, &Thresholds::default(), Unit::MgDl)
            .unwrap();
        assert_eq!(current.glucose, 200.0);
        assert_eq!(current.status, "high");
    }

    #[test]
    fn hourly_averages_group_by_utc_hour() {
        let analyzer = GlucoseAnalyzer::new();
        let hour_ms = 3_600_000i64;
        let set = vec![
            reading(3 * hour_ms, 100),
            reading(3 * hour_ms + 600_000, 120),
            reading(7 * hour_ms, 140),
        ];
        let result = analyzer
            .analyze(&set, 1, &Thresholds::default(), Unit::MgDl)
            .unwrap();
        assert_eq!(result.hourly_averages.get(&3), Some(&110.0));
        assert_eq!(result.hourly_averages.get(&7), Some(&140.0));
        assert_eq!(result.hourly_averages.len(), 2);
    }

    #[test]
    fn analyze_reports_date_range_and_count() {
        let analyzer = GlucoseAnalyzer::new();
        let day_ms = 86_400_000i64;
        let set = vec![reading(0, 100), reading(2 * day_ms, 120)];
        let result = analyzer
            .analyze(&set, 7, &Thresholds::default(), Unit::MgDl)
            .unwrap();
        assert_eq!(result.reading_count, 2);
        assert_eq!(result.date_range.from, "1970-01-01");
        assert_eq!(result.date_range.to, "1970-01-03");
        assert_eq!(result.date_range.days_analyzed, 7);
    }

    #[test]
    fn mmol_display_converts_stats_but_not_gmi_or_cv() {
        let analyzer = GlucoseAnalyzer::new();
        let result = analyzer
            .analyze(&readings(&[138, 139]), 90, &Thresholds::default(), Unit::MmolL)
            .unwrap();
        // 138.5 mg/dL -> 7.7 mmol/L
        assert_eq!(result.statistics.mean, 7.7);
        assert_eq!(result.statistics.unit, "mmol/L");
        // GMI still computed from the raw mg/dL mean
        assert_eq!(result.gmi_estimated_a1c, 6.6);
    }
}
