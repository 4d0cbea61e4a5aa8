//! Display units, glucose thresholds, and status bucketing.

use serde::Serialize;

use crate::model::ServerSettings;

/// mg/dL per mmol/L, the molar mass conversion for glucose.
pub const MGDL_PER_MMOL: f64 = 18.0182;

/// Rounds to one decimal place, matching the report precision everywhere.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Display unit for glucose values. GMI and CV are always computed from raw
/// mg/dL values regardless of this setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Unit {
    #[default]
    MgDl,
    MmolL,
}

impl Unit {
    pub fn from_settings(settings: &ServerSettings) -> Unit {
        match &settings.units {
            Some(units) if units.to_lowercase().starts_with("mmol") => Unit::MmolL,
            _ => Unit::MgDl,
        }
    }

    /// Converts an mg/dL value into the display unit. mmol/L values are
    /// rounded to one decimal; mg/dL values pass through untouched.
    pub fn convert(self, mg_dl: f64) -> f64 {
        match self {
            Unit::MgDl => mg_dl,
            Unit::MmolL => round1(mg_dl / MGDL_PER_MMOL),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Unit::MgDl => "mg/dL",
            Unit::MmolL => "mmol/L",
        }
    }
}

/// Status category for a single glucose value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GlucoseStatus {
    VeryLow,
    Low,
    InRange,
    High,
    VeryHigh,
}

impl GlucoseStatus {
    /// Human-readable label, as shown by the `current` command.
    pub fn label(self) -> &'static str {
        match self {
            GlucoseStatus::VeryLow => "VERY LOW - urgent",
            GlucoseStatus::Low => "low",
            GlucoseStatus::InRange => "in range",
            GlucoseStatus::High => "high",
            GlucoseStatus::VeryHigh => "VERY HIGH",
        }
    }
}

/// Glucose bucket boundaries in mg/dL. Buckets are inclusive at the lower
/// bound and exclusive at the upper, except the open-ended top bucket:
/// `<urgent_low`, `urgent_low..target_low`, `target_low..=target_high`,
/// `target_high+1..=high`, `>high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub urgent_low: i32,
    pub target_low: i32,
    pub target_high: i32,
    pub high: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            urgent_low: 54,
            target_low: 70,
            target_high: 180,
            high: 250,
        }
    }
}

impl Thresholds {
    /// Applies server-side overrides on top of the defaults.
    pub fn from_settings(settings: &ServerSettings) -> Thresholds {
        let mut thresholds = Thresholds::default();
        if let Some(overrides) = &settings.thresholds {
            if let Some(v) = overrides.bg_low {
                thresholds.urgent_low = v;
            }
            if let Some(v) = overrides.bg_target_bottom {
                thresholds.target_low = v;
            }
            if let Some(v) = overrides.bg_target_top {
                thresholds.target_high = v;
            }
            if let Some(v) = overrides.bg_high {
                thresholds.high = v;
            }
        }
        thresholds
    }

    pub fn status(&self, glucose_mg_dl: i32) -> GlucoseStatus {
        if glucose_mg_dl < self.urgent_low {
            GlucoseStatus::VeryLow
        } else if glucose_mg_dl < self.target_low {
            GlucoseStatus::Low
        } else if glucose_mg_dl <= self.target_high {
            GlucoseStatus::InRange
        } else if glucose_mg_dl <= self.high {
            GlucoseStatus::High
        } else {
            GlucoseStatus::VeryHigh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServerSettings;

    #[test]
    fn default_boundaries_bucket_correctly() {
        let t = Thresholds::default();
        assert_eq!(t.status(40), GlucoseStatus::VeryLow);
        assert_eq!(t.status(53), GlucoseStatus::VeryLow);
        assert_eq!(t.status(54), GlucoseStatus::Low);
        assert_eq!(t.status(69), GlucoseStatus::Low);
        assert_eq!(t.status(70), GlucoseStatus::InRange);
        assert_eq!(t.status(180), GlucoseStatus::InRange);
        assert_eq!(t.status(181), GlucoseStatus::High);
        assert_eq!(t.status(250), GlucoseStatus::High);
        assert_eq!(t.status(251), GlucoseStatus::VeryHigh);
    }

    #[test]
    fn server_settings_override_thresholds() {
        let settings: ServerSettings = serde_json::from_str(
            r#"{"units": "mg/dl", "thresholds": {"bgLow": 60, "bgTargetTop": 160}}"#,
        )
        .unwrap();
        let t = Thresholds::from_settings(&settings);
        assert_eq!(t.urgent_low, 60);
        assert_eq!(t.target_low, 70);
        assert_eq!(t.target_high, 160);
        assert_eq!(t.high, 250);
    }

    #[test]
    fn mmol_unit_detection_and_conversion() {
        let settings: ServerSettings =
            serde_json::from_str(r#"{"units": "mmol/L"}"#).unwrap();
        let unit = Unit::from_settings(&settings);
        assert_eq!(unit, Unit::MmolL);
        assert_eq!(unit.label(), "mmol/L");
        // 180 mg/dL is 9.99 mmol/L, rounded to 10.0
        assert_eq!(unit.convert(180.0), 10.0);
    }

    #[test]
    fn mgdl_passes_through_unrounded() {
        let unit = Unit::MgDl;
        assert_eq!(unit.convert(123.45), 123.45);
        assert_eq!(unit.label(), "mg/dL");
    }

    #[test]
    fn missing_settings_use_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(Unit::from_settings(&settings), Unit::MgDl);
        assert_eq!(Thresholds::from_settings(&settings), Thresholds::default());
    }
}
