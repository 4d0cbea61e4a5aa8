// Core structs: Entry (wire), Reading, analysis records, per-concern errors.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::units::GlucoseStatus;

/// Raw Nightscout entry as returned by `/api/v1/entries.json`.
/// Everything except `_id` is optional on the wire; uploaders differ.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub sgv: Option<i32>,
    #[serde(rename = "type", default)]
    pub entry_type: Option<String>,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(rename = "dateString", default)]
    pub date_string: Option<String>,
    #[serde(default)]
    pub trend: Option<i32>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
}

impl Entry {
    pub fn is_sgv(&self) -> bool {
        self.entry_type.as_deref() == Some("sgv")
    }
}

/// Glucose trend arrow, from the Nightscout `direction` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    DoubleUp,
    SingleUp,
    FortyFiveUp,
    Flat,
    FortyFiveDown,
    SingleDown,
    DoubleDown,
    #[serde(alias = "NOT COMPUTABLE")]
    NotComputable,
    #[serde(alias = "RATE OUT OF RANGE")]
    RateOutOfRange,
}

impl Trend {
    /// Lenient parse of a `direction` string. Some uploaders send the
    /// uppercase forms; anything unrecognized maps to `NotComputable`.
    pub fn from_direction(direction: Option<&str>) -> Trend {
        match direction {
            Some("DoubleUp") => Trend::DoubleUp,
            Some("SingleUp") => Trend::SingleUp,
            Some("FortyFiveUp") => Trend::FortyFiveUp,
            Some("Flat") => Trend::Flat,
            Some("FortyFiveDown") => Trend::FortyFiveDown,
            Some("SingleDown") => Trend::SingleDown,
            Some("DoubleDown") => Trend::DoubleDown,
            Some("RateOutOfRange") | Some("RATE OUT OF RANGE") => Trend::RateOutOfRange,
            _ => Trend::NotComputable,
        }
    }
}

/// A validated glucose reading. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub glucose_mg_dl: i32,
    pub trend: Trend,
}

impl Reading {
    /// Builds a reading from a raw entry. Returns `None` for non-SGV
    /// entries, missing timestamps, and zero or negative glucose values.
    pub fn from_entry(entry: &Entry) -> Option<Reading> {
        if !entry.is_sgv() {
            return None;
        }
        let sgv = entry.sgv.filter(|&v| v > 0)?;
        let timestamp = DateTime::from_timestamp_millis(entry.date?)?;
        Some(Reading {
            timestamp,
            glucose_mg_dl: sgv,
            trend: Trend::from_direction(entry.direction.as_deref()),
        })
    }
}

/// Basic descriptive statistics over a reading window, in the display unit.
#[derive(Debug, Clone, Serialize)]
pub struct GlucoseStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub unit: String,
}

/// Time-in-range bucket percentages. The five buckets partition the glucose
/// axis, so the raw percentages sum to exactly 100 for any non-empty input.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TimeInRange {
    pub very_low_pct: f64,
    pub low_pct: f64,
    pub in_range_pct: f64,
    pub high_pct: f64,
    pub very_high_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateRange {
    pub from: String,
    pub to: String,
    pub days_analyzed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CvStatus {
    Stable,
    Unstable,
}

/// Full analysis record, the JSON body of the `analyze` command.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub date_range: DateRange,
    pub reading_count: usize,
    pub statistics: GlucoseStats,
    pub time_in_range: TimeInRange,
    pub gmi_estimated_a1c: f64,
    pub cv_variability: f64,
    pub cv_status: CvStatus,
    pub hourly_averages: BTreeMap<u32, f64>,
    pub unit: String,
}

/// Latest reading with its trend and status label, the `current` command body.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentGlucose {
    pub glucose: f64,
    pub unit: String,
    pub trend: Trend,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub status: String,
    pub new_readings: usize,
    pub total_readings: i64,
    pub database: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayReading {
    pub time: String,
    pub glucose: f64,
    pub trend: Trend,
    pub status: GlucoseStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayReadings {
    pub date: String,
    pub readings: Vec<DayReading>,
    pub unit: String,
}

/// Server-side settings from `/api/v1/status.json`, reduced to the parts
/// the analyzer cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub thresholds: Option<ServerThresholds>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerThresholds {
    #[serde(rename = "bgLow", default)]
    pub bg_low: Option<i32>,
    #[serde(rename = "bgTargetBottom", default)]
    pub bg_target_bottom: Option<i32>,
    #[serde(rename = "bgTargetTop", default)]
    pub bg_target_top: Option<i32>,
    #[serde(rename = "bgHigh", default)]
    pub bg_high: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub settings: ServerSettings,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "NIGHTSCOUT_URL environment variable not set; point it at your \
         Nightscout site, e.g. https://your-site.example.com"
    )]
    MissingUrl,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response status: {0}")]
    BadStatus(reqwest::StatusCode),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("no readings found for the selected period; run 'refresh' first")]
    EmptyDataset,
    #[error("no data available")]
    NoData,
    #[error("invalid data: mean glucose is zero")]
    InvalidData,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
    #[error("invalid date '{0}': expected today, yesterday, or YYYY-MM-DD")]
    InvalidDate(String),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
