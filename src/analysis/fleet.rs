/// Cross-plant summary built from current plant rows (not history).

use serde::Serialize;

use super::stats::{round2, KpiSettings};
use crate::error::MonitorError;
use crate::model::Plant;
use crate::store::PlantStore;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FleetStats {
    pub total: usize,
    pub producing: usize,
    pub in_maintenance: usize,
    pub alarming: usize,
    pub mean_purity: f64,
    pub total_flow: f64,
}

pub fn fleet_stats(plants: &[Plant], settings: &KpiSettings) -> FleetStats {
    let total = plants.len();
    if total == 0 {
        return FleetStats::default();
    }

    let in_mode = |label: &str| plants.iter().filter(|p| p.telemetry.mode == label).count();
    let purity_sum: f64 = plants.iter().map(|p| p.telemetry.purity_pct).sum();

    FleetStats {
        total,
        producing: in_mode(&settings.production_mode),
        in_maintenance: in_mode(&settings.maintenance_mode),
        alarming: plants.iter().filter(|p| p.telemetry.alarm).count(),
        mean_purity: round2(purity_sum / total as f64),
        total_flow: round2(plants.iter().map(|p| p.telemetry.flow_nm3h).sum()),
    }
}

/// Fleet summary of every listed plant.
pub fn global_stats<S: PlantStore>(store: &mut S, settings: &KpiSettings) -> Result<FleetStats, MonitorError> {
    let plants = store.list_plants(false)?;
    Ok(fleet_stats(&plants, settings))
}
