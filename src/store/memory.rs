/// In-process `PlantStore`.
///
/// Used by the test suites and by `psamon_service --memory` for dry runs
/// without PostgreSQL. Transactions apply writes directly and keep an undo
/// log; dropping an uncommitted `MemoryTransaction` replays it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::{PlantStore, StoreTransaction, Transactional};
use crate::admin::{PlantChanges, PlantRegistration};
use crate::error::StoreError;
use crate::model::{default_plant_name, Plant, Reading, Telemetry, TelemetryUpdate};
use crate::window::TimeRange;

#[derive(Debug, Default)]
pub struct MemoryStore {
    plants: BTreeMap<String, Plant>,
    readings: Vec<Reading>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total history rows across all plants.
    pub fn reading_count(&self) -> usize {
        self.readings.len()
    }

    fn put_plant(&mut self, plant: Plant) -> Option<Plant> {
        self.plants.insert(plant.id.clone(), plant)
    }
}

impl PlantStore for MemoryStore {
    fn get_plant(&mut self, plant_id: &str) -> Result<Option<Plant>, StoreError> {
        Ok(self.plants.get(plant_id).cloned())
    }

    fn list_plants(&mut self, include_inactive: bool) -> Result<Vec<Plant>, StoreError> {
        let mut plants: Vec<Plant> = self
            .plants
            .values()
            .filter(|p| include_inactive || p.lifecycle.is_listed())
            .cloned()
            .collect();
        plants.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plants)
    }

    fn upsert_plant(
        &mut self,
        plant_id: &str,
        at: DateTime<Utc>,
        update: &TelemetryUpdate,
    ) -> Result<bool, StoreError> {
        let (mut plant, created) = match self.plants.get(plant_id) {
            Some(existing) => (existing.clone(), false),
            None => {
                let name = update
                    .name
                    .clone()
                    .unwrap_or_else(|| default_plant_name(plant_id));
                (Plant::provisioned(plant_id, name, at), true)
            }
        };

        if let Some(name) = &update.name {
            plant.name = name.clone();
        }
        plant.telemetry = update.telemetry.clone();
        plant.last_updated = Some(at);

        self.put_plant(plant);
        Ok(created)
    }

    fn append_reading(
        &mut self,
        plant_id: &str,
        at: DateTime<Utc>,
        telemetry: &Telemetry,
    ) -> Result<(), StoreError> {
        self.readings.push(Reading::captured(plant_id, at, telemetry));
        Ok(())
    }

    fn history(
        &mut self,
        plant_id: &str,
        range: &TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Reading>, StoreError> {
        let mut rows: Vec<Reading> = self
            .readings
            .iter()
            .filter(|r| r.plant_id == plant_id && range.contains(r.recorded_at))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        rows.sort_by_key(|r| r.recorded_at);
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn insert_plant(&mut self, registration: &PlantRegistration) -> Result<bool, StoreError> {
        if self.plants.contains_key(&registration.id) {
            return Ok(false);
        }
        self.put_plant(registration.to_plant(Utc::now()));
        Ok(true)
    }

    fn update_plant(&mut self, plant_id: &str, changes: &PlantChanges) -> Result<bool, StoreError> {
        match self.plants.get_mut(plant_id) {
            Some(plant) => {
                changes.apply_to(plant);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Write-through transaction with an undo log.
pub struct MemoryTransaction<'a> {
    store: &'a mut MemoryStore,
    /// Previous value of every plant row touched, oldest first.
    undo_plants: Vec<(String, Option<Plant>)>,
    readings_mark: usize,
    committed: bool,
}

impl MemoryTransaction<'_> {
    fn remember(&mut self, plant_id: &str) {
        let previous = self.store.plants.get(plant_id).cloned();
        self.undo_plants.push((plant_id.to_string(), previous));
    }
}

impl PlantStore for MemoryTransaction<'_> {
    fn get_plant(&mut self, plant_id: &str) -> Result<Option<Plant>, StoreError> {
        self.store.get_plant(plant_id)
    }

    fn list_plants(&mut self, include_inactive: bool) -> Result<Vec<Plant>, StoreError> {
        self.store.list_plants(include_inactive)
    }

    fn upsert_plant(
        &mut self,
        plant_id: &str,
        at: DateTime<Utc>,
        update: &TelemetryUpdate,
    ) -> Result<bool, StoreError> {
        self.remember(plant_id);
        self.store.upsert_plant(plant_id, at, update)
    }

    fn append_reading(
        &mut self,
        plant_id: &str,
        at: DateTime<Utc>,
        telemetry: &Telemetry,
    ) -> Result<(), StoreError> {
        self.store.append_reading(plant_id, at, telemetry)
    }

    fn history(
        &mut self,
        plant_id: &str,
        range: &TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Reading>, StoreError> {
        self.store.history(plant_id, range, limit)
    }

    fn insert_plant(&mut self, registration: &PlantRegistration) -> Result<bool, StoreError> {
        self.remember(&registration.id);
        self.store.insert_plant(registration)
    }

    fn update_plant(&mut self, plant_id: &str, changes: &PlantChanges) -> Result<bool, StoreError> {
        self.remember(plant_id);
        self.store.update_plant(plant_id, changes)
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn commit(mut self) -> Result<(), StoreError> {
        self.committed = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some((plant_id, previous)) = self.undo_plants.pop() {
            match previous {
                Some(plant) => {
                    self.store.plants.insert(plant_id, plant);
                }
                None => {
                    self.store.plants.remove(&plant_id);
                }
            }
        }
        self.store.readings.truncate(self.readings_mark);
    }
}

impl Transactional for MemoryStore {
    type Tx<'a> = MemoryTransaction<'a>;

    fn begin(&mut self) -> Result<Self::Tx<'_>, StoreError> {
        let readings_mark = self.readings.len();
        Ok(MemoryTransaction {
            store: self,
            undo_plants: Vec::new(),
            readings_mark,
            committed: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
