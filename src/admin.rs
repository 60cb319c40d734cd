/// Administrative plant operations: registration, allow-listed edits and
/// lifecycle changes.
///
/// Telemetry is never writable from here. `PlantChanges` is the explicit
/// allow-list of administrative fields; payloads carrying any other key
/// (including telemetry keys such as `purity_pct`) fail to deserialize.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::MonitorError;
use crate::model::{InstallationType, LifecycleState, Plant};
use crate::store::{PlantStore, StoreTransaction, Transactional};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A plant registered by an administrator before (or after) it reports.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PlantRegistration {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub internal_code: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub responsible: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub installation_type: InstallationType,
    #[serde(default)]
    pub nominal_capacity_nm3h: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PlantRegistration {
    /// Plant row for this registration, with no telemetry yet.
    pub fn to_plant(&self, created_at: DateTime<Utc>) -> Plant {
        let mut plant = Plant::provisioned(&self.id, self.name.clone(), created_at);
        plant.internal_code = self.internal_code.clone();
        plant.location = self.location.clone();
        plant.city = self.city.clone();
        plant.responsible = self.responsible.clone();
        plant.contact_email = self.contact_email.clone();
        plant.installation_type = self.installation_type;
        plant.nominal_capacity_nm3h = self.nominal_capacity_nm3h;
        plant.notes = self.notes.clone();
        plant
    }
}

/// Allow-listed administrative edit. `None` leaves a field untouched.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PlantChanges {
    pub name: Option<String>,
    pub internal_code: Option<String>,
    pub location: Option<String>,
    pub city: Option<String>,
    pub responsible: Option<String>,
    pub contact_email: Option<String>,
    pub installation_type: Option<InstallationType>,
    pub nominal_capacity_nm3h: Option<f64>,
    pub notes: Option<String>,
    pub lifecycle: Option<LifecycleState>,
}

impl PlantChanges {
    pub fn is_empty(&self) -> bool {
        *self == PlantChanges::default()
    }

    pub fn apply_to(&self, plant: &mut Plant) {
        if let Some(v) = &self.name {
            plant.name = v.clone();
        }
        if let Some(v) = &self.internal_code {
            plant.internal_code = Some(v.clone());
        }
        if let Some(v) = &self.location {
            plant.location = v.clone();
        }
        if let Some(v) = &self.city {
            plant.city = Some(v.clone());
        }
        if let Some(v) = &self.responsible {
            plant.responsible = Some(v.clone());
        }
        if let Some(v) = &self.contact_email {
            plant.contact_email = Some(v.clone());
        }
        if let Some(v) = self.installation_type {
            plant.installation_type = v;
        }
        if let Some(v) = self.nominal_capacity_nm3h {
            plant.nominal_capacity_nm3h = Some(v);
        }
        if let Some(v) = &self.notes {
            plant.notes = Some(v.clone());
        }
        if let Some(v) = self.lifecycle {
            plant.lifecycle = v;
        }
    }

    fn validate(&self) -> Result<(), MonitorError> {
        if self.is_empty() {
            return Err(MonitorError::validation("no administrative fields to update"));
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(MonitorError::validation("name must not be empty"));
            }
        }
        check_capacity(self.nominal_capacity_nm3h)
    }
}

fn check_capacity(capacity: Option<f64>) -> Result<(), MonitorError> {
    match capacity {
        Some(c) if !c.is_finite() || c < 0.0 => Err(MonitorError::validation(
            "nominal_capacity_nm3h must be a non-negative number",
        )),
        _ => Ok(()),
    }
}

/// Internal codes are unique among listed plants. Decommissioned and
/// inactive plants release theirs.
fn check_internal_code<T: PlantStore>(
    tx: &mut T,
    internal_code: Option<&str>,
    plant_id: &str,
) -> Result<(), MonitorError> {
    let Some(code) = internal_code.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(());
    };
    match tx.internal_code_owner(code, plant_id)? {
        Some(owner) => Err(MonitorError::Conflict(format!(
            "internal code '{}' is already assigned to plant '{}'",
            code, owner
        ))),
        None => Ok(()),
    }
}

/// Plant ids are lowercase with underscores: "Hospital Central" → "hospital_central".
pub fn normalize_plant_id(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Register a plant. Returns the normalized id.
pub fn register_plant<S: Transactional>(
    store: &mut S,
    registration: &PlantRegistration,
) -> Result<String, MonitorError> {
    let mut registration = registration.clone();
    registration.id = normalize_plant_id(&registration.id);
    registration.name = registration.name.trim().to_string();
    registration.internal_code = registration
        .internal_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    if registration.id.is_empty() || registration.name.is_empty() {
        return Err(MonitorError::validation("id and name are required"));
    }
    check_capacity(registration.nominal_capacity_nm3h)?;

    let mut tx = store.begin()?;
    check_internal_code(&mut tx, registration.internal_code.as_deref(), &registration.id)?;
    if !tx.insert_plant(&registration)? {
        return Err(MonitorError::Conflict(format!(
            "a plant with id '{}' already exists",
            registration.id
        )));
    }
    tx.commit()?;

    info!(plant_id = %registration.id, "plant registered");
    Ok(registration.id)
}

/// Apply an allow-listed edit and return the updated plant.
pub fn update_plant<S: Transactional>(
    store: &mut S,
    plant_id: &str,
    changes: &PlantChanges,
) -> Result<Plant, MonitorError> {
    changes.validate()?;

    let mut tx = store.begin()?;
    if changes.internal_code.is_some() || changes.lifecycle.is_some() {
        let Some(mut target) = tx.get_plant(plant_id)? else {
            return Err(MonitorError::not_found(format!("plant '{}'", plant_id)));
        };
        changes.apply_to(&mut target);
        if target.lifecycle.is_listed() {
            check_internal_code(&mut tx, target.internal_code.as_deref(), plant_id)?;
        }
    }
    if !tx.update_plant(plant_id, changes)? {
        return Err(MonitorError::not_found(format!("plant '{}'", plant_id)));
    }
    let plant = tx
        .get_plant(plant_id)?
        .ok_or_else(|| MonitorError::not_found(format!("plant '{}'", plant_id)))?;
    tx.commit()?;

    info!(plant_id, "plant updated");
    Ok(plant)
}

pub fn set_lifecycle<S: Transactional>(
    store: &mut S,
    plant_id: &str,
    state: LifecycleState,
) -> Result<Plant, MonitorError> {
    let changes = PlantChanges {
        lifecycle: Some(state),
        ..PlantChanges::default()
    };
    update_plant(store, plant_id, &changes)
}

/// Soft delete. The plant row and its history stay in place.
pub fn deactivate_plant<S: Transactional>(store: &mut S, plant_id: &str) -> Result<Plant, MonitorError> {
    set_lifecycle(store, plant_id, LifecycleState::Decommissioned)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ingest_at, ReadingPayload};
    use crate::store::MemoryStore;

    fn registration(id: &str, name: &str) -> PlantRegistration {
        PlantRegistration {
            id: id.to_string(),
            name: name.to_string(),
            ..PlantRegistration::default()
        }
    }

    #[test]
    fn test_register_normalizes_id() {
        let mut store = MemoryStore::new();
        let id = register_plant(&mut store, &registration(" Hospital Central ", "Hospital Central"))
            .expect("registration should succeed");
        assert_eq!(id, "hospital_central");
        assert!(store.get_plant("hospital_central").unwrap().is_some());
    }

    #[test]
    fn test_register_requires_id_and_name() {
        let mut store = MemoryStore::new();
        let err = register_plant(&mut store, &registration("  ", "Name")).unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));
        let err = register_plant(&mut store, &registration("x", " ")).unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));
    }

    #[test]
    fn test_register_duplicate_is_conflict() {
        let mut store = MemoryStore::new();
        register_plant(&mut store, &registration("norte", "Norte")).unwrap();
        let err = register_plant(&mut store, &registration("norte", "Otra")).unwrap_err();
        assert!(matches!(err, MonitorError::Conflict(_)));
        assert_eq!(store.get_plant("norte").unwrap().unwrap().name, "Norte");
    }

    #[test]
    fn test_changes_reject_telemetry_keys() {
        let result: Result<PlantChanges, _> =
            serde_json::from_str(r#"{"name": "X", "purity_pct": 99.0}"#);
        assert!(result.is_err(), "telemetry fields must not be accepted by admin edits");
    }

    #[test]
    fn test_update_does_not_touch_telemetry() {
        let mut store = MemoryStore::new();
        let payload = ReadingPayload {
            purity_pct: Some(94.2),
            mode: Some("Production".to_string()),
            ..ReadingPayload::default()
        };
        ingest_at(&mut store, Some("norte"), &payload, Utc::now()).unwrap();

        let changes: PlantChanges =
            serde_json::from_str(r#"{"name": "Hospital Norte", "city": "Cusco"}"#).unwrap();
        let plant = update_plant(&mut store, "norte", &changes).unwrap();

        assert_eq!(plant.name, "Hospital Norte");
        assert_eq!(plant.city.as_deref(), Some("Cusco"));
        assert_eq!(plant.telemetry.purity_pct, 94.2);
        assert_eq!(plant.telemetry.mode, "Production");
    }

    #[test]
    fn test_update_unknown_plant_is_not_found() {
        let mut store = MemoryStore::new();
        let changes = PlantChanges {
            notes: Some("x".to_string()),
            ..PlantChanges::default()
        };
        let err = update_plant(&mut store, "ghost", &changes).unwrap_err();
        assert!(matches!(err, MonitorError::NotFound(_)));
    }

    #[test]
    fn test_empty_changes_are_rejected() {
        let mut store = MemoryStore::new();
        register_plant(&mut store, &registration("norte", "Norte")).unwrap();
        let err = update_plant(&mut store, "norte", &PlantChanges::default()).unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));
    }

    fn coded(id: &str, code: &str) -> PlantRegistration {
        PlantRegistration {
            internal_code: Some(code.to_string()),
            ..registration(id, id)
        }
    }

    #[test]
    fn test_register_rejects_bad_capacity() {
        let mut store = MemoryStore::new();
        for capacity in [-1.0, f64::NAN, f64::INFINITY] {
            let reg = PlantRegistration {
                nominal_capacity_nm3h: Some(capacity),
                ..registration("norte", "Norte")
            };
            let err = register_plant(&mut store, &reg).unwrap_err();
            assert!(matches!(err, MonitorError::Validation(_)), "capacity {}", capacity);
        }
        assert!(store.get_plant("norte").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_internal_code_is_conflict() {
        let mut store = MemoryStore::new();
        register_plant(&mut store, &coded("norte", "PSA-001")).unwrap();

        let err = register_plant(&mut store, &coded("sur", " PSA-001 ")).unwrap_err();
        assert!(matches!(err, MonitorError::Conflict(_)));
        assert!(store.get_plant("sur").unwrap().is_none());

        register_plant(&mut store, &coded("sur", "PSA-002")).unwrap();
        let changes = PlantChanges {
            internal_code: Some("PSA-001".to_string()),
            ..PlantChanges::default()
        };
        let err = update_plant(&mut store, "sur", &changes).unwrap_err();
        assert!(matches!(err, MonitorError::Conflict(_)));
        assert_eq!(store.get_plant("sur").unwrap().unwrap().internal_code.as_deref(), Some("PSA-002"));

        // Re-saving a plant's own code is not a conflict.
        update_plant(&mut store, "norte", &changes).unwrap();
    }

    #[test]
    fn test_decommissioned_plant_releases_internal_code() {
        let mut store = MemoryStore::new();
        register_plant(&mut store, &coded("norte", "PSA-001")).unwrap();
        deactivate_plant(&mut store, "norte").unwrap();

        register_plant(&mut store, &coded("sur", "PSA-001")).unwrap();

        let err = set_lifecycle(&mut store, "norte", LifecycleState::Active).unwrap_err();
        assert!(matches!(err, MonitorError::Conflict(_)));
        assert_eq!(
            store.get_plant("norte").unwrap().unwrap().lifecycle,
            LifecycleState::Decommissioned
        );
    }

    #[test]
    fn test_deactivate_hides_plant_but_keeps_history() {
        let mut store = MemoryStore::new();
        ingest_at(&mut store, Some("norte"), &ReadingPayload::default(), Utc::now()).unwrap();

        let plant = deactivate_plant(&mut store, "norte").unwrap();
        assert_eq!(plant.lifecycle, LifecycleState::Decommissioned);
        assert!(store.list_plants(false).unwrap().is_empty());
        assert_eq!(store.reading_count(), 1);
    }
}
