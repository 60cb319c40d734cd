/// Statistics Engine for the PSA monitoring service.
///
/// Submodules:
/// - `stats` — per-metric statistics, mode distribution and KPIs over history rows.
/// - `fleet` — cross-plant summary over current plant rows.

pub mod fleet;
pub mod stats;

pub use fleet::{fleet_stats, global_stats, FleetStats};
pub use stats::{metric_stats, summarize, summarize_with, KpiSettings, Kpis, MetricStats, StatsSummary};
