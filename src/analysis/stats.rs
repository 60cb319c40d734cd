/// Statistics over a set of history rows.
///
/// `summarize` computes per-metric min/max/avg/std for purity, flow,
/// pressure and temperature, the alarm count, the mode distribution and the
/// two KPIs (availability, purity compliance). Computation is done in full
/// precision; every reported number is rounded to 2 decimals on the way out.
///
/// An empty input, or a metric with no values, yields zeros rather than an
/// error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Reading, DEFAULT_MODE, MAINTENANCE_MODE, PRODUCTION_MODE, PURITY_COMPLIANCE_THRESHOLD_PCT};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// KPI parameters. Defaults are the domain constants; the `[kpi]` config
/// table overrides them service-wide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiSettings {
    /// A purity reading at or above this value is compliant.
    pub purity_threshold_pct: f64,
    /// Mode label counted as available.
    pub production_mode: String,
    pub maintenance_mode: String,
}

impl Default for KpiSettings {
    fn default() -> Self {
        Self {
            purity_threshold_pct: PURITY_COMPLIANCE_THRESHOLD_PCT,
            production_mode: PRODUCTION_MODE.to_string(),
            maintenance_mode: MAINTENANCE_MODE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub std: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Kpis {
    pub availability_pct: f64,
    pub purity_compliance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StatsSummary {
    pub total_records: usize,
    pub purity: MetricStats,
    pub flow: MetricStats,
    pub pressure: MetricStats,
    pub temperature: MetricStats,
    pub alarm_count: usize,
    pub mode_distribution: BTreeMap<String, usize>,
    pub kpis: Kpis,
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

pub fn summarize(readings: &[Reading]) -> StatsSummary {
    summarize_with(readings, &KpiSettings::default())
}

pub fn summarize_with(readings: &[Reading], settings: &KpiSettings) -> StatsSummary {
    let purity: Vec<f64> = readings.iter().filter_map(|r| r.purity_pct).collect();
    let flow: Vec<f64> = readings.iter().filter_map(|r| r.flow_nm3h).collect();
    let pressure: Vec<f64> = readings.iter().filter_map(|r| r.pressure_bar).collect();
    let temperature: Vec<f64> = readings.iter().filter_map(|r| r.temperature_c).collect();

    let mut mode_distribution = BTreeMap::new();
    for reading in readings {
        let mode = reading.mode.as_deref().unwrap_or(DEFAULT_MODE);
        *mode_distribution.entry(mode.to_string()).or_insert(0) += 1;
    }

    let producing = readings
        .iter()
        .filter(|r| r.mode.as_deref() == Some(settings.production_mode.as_str()))
        .count();
    let compliant = purity
        .iter()
        .filter(|&&p| p >= settings.purity_threshold_pct)
        .count();

    StatsSummary {
        total_records: readings.len(),
        purity: metric_stats(&purity),
        flow: metric_stats(&flow),
        pressure: metric_stats(&pressure),
        temperature: metric_stats(&temperature),
        alarm_count: readings.iter().filter(|r| r.alarm).count(),
        mode_distribution,
        kpis: Kpis {
            availability_pct: percentage(producing, readings.len()),
            purity_compliance_pct: percentage(compliant, purity.len()),
        },
    }
}

/// Min/max/mean and sample standard deviation (N-1), rounded to 2 decimals.
pub fn metric_stats(values: &[f64]) -> MetricStats {
    let count = values.len();
    if count == 0 {
        return MetricStats::default();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = values.iter().sum::<f64>() / count as f64;
    let std = if count > 1 {
        let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
        (sum_sq / (count - 1) as f64).sqrt()
    } else {
        0.0
    };

    MetricStats {
        min: round2(min),
        max: round2(max),
        avg: round2(avg),
        std: round2(std),
        count,
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
