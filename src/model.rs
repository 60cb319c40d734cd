/// Shared data types for the PSA plant monitoring service.
///
/// `Plant` is the current-state row (one per plant identifier), `Reading` is
/// one append-only history row. Telemetry is carried by `Telemetry`, which is
/// always fully resolved (defaults applied) by the time it reaches a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Domain constants
// ---------------------------------------------------------------------------

/// Mode label recorded when a device does not report one.
pub const DEFAULT_MODE: &str = "Unknown";

/// Canonical productive-mode label used by the availability KPI.
pub const PRODUCTION_MODE: &str = "Production";

/// Mode label counted as "in maintenance" by the fleet summary.
pub const MAINTENANCE_MODE: &str = "Maintenance";

/// Minimum oxygen purity (%) a reading must reach to count as compliant.
pub const PURITY_COMPLIANCE_THRESHOLD_PCT: f64 = 93.0;

/// Display name given to plants that report before they are registered.
pub fn default_plant_name(plant_id: &str) -> String {
    format!("Plant {}", plant_id)
}

// ---------------------------------------------------------------------------
// Lifecycle and installation
// ---------------------------------------------------------------------------

/// Administrative lifecycle of a plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Active,
    Inactive,
    Maintenance,
    Decommissioned,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Active => "active",
            LifecycleState::Inactive => "inactive",
            LifecycleState::Maintenance => "maintenance",
            LifecycleState::Decommissioned => "decommissioned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LifecycleState::Active),
            "inactive" => Some(LifecycleState::Inactive),
            "maintenance" => Some(LifecycleState::Maintenance),
            "decommissioned" => Some(LifecycleState::Decommissioned),
            _ => None,
        }
    }

    /// Whether the plant shows up in default listings.
    /// Plants under maintenance are still part of the working fleet.
    pub fn is_listed(&self) -> bool {
        matches!(self, LifecycleState::Active | LifecycleState::Maintenance)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of PSA trains installed at a plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstallationType {
    #[default]
    Simplex,
    Duplex,
    Triplex,
}

impl InstallationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallationType::Simplex => "simplex",
            InstallationType::Duplex => "duplex",
            InstallationType::Triplex => "triplex",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "simplex" => Some(InstallationType::Simplex),
            "duplex" => Some(InstallationType::Duplex),
            "triplex" => Some(InstallationType::Triplex),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Resolved live telemetry of a plant. Every field has a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub pressure_bar: f64,
    pub temperature_c: f64,
    pub purity_pct: f64,
    pub flow_nm3h: f64,
    pub operating_hours: f64,
    pub mode: String,
    pub alarm: bool,
    pub alarm_message: String,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            pressure_bar: 0.0,
            temperature_c: 0.0,
            purity_pct: 0.0,
            flow_nm3h: 0.0,
            operating_hours: 0.0,
            mode: DEFAULT_MODE.to_string(),
            alarm: false,
            alarm_message: String::new(),
        }
    }
}

/// What the Ingestion Reducer hands to `PlantStore::upsert_plant`.
///
/// `name` is only set when the device explicitly reported one; otherwise the
/// stored name is preserved (or derived from the id on first contact).
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryUpdate {
    pub name: Option<String>,
    pub telemetry: Telemetry,
}

// ---------------------------------------------------------------------------
// Plant
// ---------------------------------------------------------------------------

/// Current-state row for one plant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plant {
    pub id: String,
    pub name: String,
    pub internal_code: Option<String>,
    pub location: String,
    pub city: Option<String>,
    pub responsible: Option<String>,
    pub contact_email: Option<String>,
    pub installation_type: InstallationType,
    pub nominal_capacity_nm3h: Option<f64>,
    pub notes: Option<String>,
    pub lifecycle: LifecycleState,

    #[serde(flatten)]
    pub telemetry: Telemetry,

    pub last_updated: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Plant {
    /// A freshly provisioned plant with no administrative data.
    pub fn provisioned(id: &str, name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            name,
            internal_code: None,
            location: String::new(),
            city: None,
            responsible: None,
            contact_email: None,
            installation_type: InstallationType::default(),
            nominal_capacity_nm3h: None,
            notes: None,
            lifecycle: LifecycleState::Active,
            telemetry: Telemetry::default(),
            last_updated: None,
            created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// One history row. Numeric fields are nullable because older rows (or rows
/// written by other tools) may not carry every metric.
///
/// Field order is the CSV export column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub plant_id: String,
    pub recorded_at: DateTime<Utc>,
    pub pressure_bar: Option<f64>,
    pub temperature_c: Option<f64>,
    pub purity_pct: Option<f64>,
    pub flow_nm3h: Option<f64>,
    pub mode: Option<String>,
    pub alarm: bool,
    pub alarm_message: Option<String>,
    pub operating_hours: Option<f64>,
}

impl Reading {
    /// The history row produced by ingesting `telemetry` at `recorded_at`.
    pub fn captured(plant_id: &str, recorded_at: DateTime<Utc>, telemetry: &Telemetry) -> Self {
        Self {
            plant_id: plant_id.to_string(),
            recorded_at,
            pressure_bar: Some(telemetry.pressure_bar),
            temperature_c: Some(telemetry.temperature_c),
            purity_pct: Some(telemetry.purity_pct),
            flow_nm3h: Some(telemetry.flow_nm3h),
            mode: Some(telemetry.mode.clone()),
            alarm: telemetry.alarm,
            alarm_message: Some(telemetry.alarm_message.clone()),
            operating_hours: Some(telemetry.operating_hours),
        }
    }
}

/// Column names of the history table, in `Reading` field order.
pub const READING_FIELDS: [&str; 10] = [
    "plant_id",
    "recorded_at",
    "pressure_bar",
    "temperature_c",
    "purity_pct",
    "flow_nm3h",
    "mode",
    "alarm",
    "alarm_message",
    "operating_hours",
];

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
