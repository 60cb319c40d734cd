/// Plant State Store: current plant rows plus the append-only history table.
///
/// ## Seams
///
/// - `PlantStore` — the row-level contract every core operation is written
///   against (`get_plant`, `upsert_plant`, `append_reading`, `history`, …).
/// - `Transactional` — a store that can open a `StoreTransaction`.
/// - `StoreTransaction` — a `PlantStore` whose writes become visible on
///   `commit()` and are rolled back when it is dropped uncommitted.
///
/// Core operations receive the store handle explicitly; nothing in this
/// crate keeps a global connection.
///
/// Implementations:
/// - `pg::PgStore` — production store (sync `postgres` client)
/// - `memory::MemoryStore` — in-process store for tests and `--memory` runs

pub mod memory;
pub mod pg;

use crate::admin::{PlantChanges, PlantRegistration};
use crate::error::StoreError;
use crate::model::{Plant, Reading, Telemetry, TelemetryUpdate};
use crate::window::TimeRange;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use pg::PgStore;

pub trait PlantStore {
    fn get_plant(&mut self, plant_id: &str) -> Result<Option<Plant>, StoreError>;

    /// `get_plant` for a read-modify-write. Inside a transaction, other
    /// callers locking the same id wait until this transaction ends, even
    /// when the plant does not exist yet.
    fn lock_plant(&mut self, plant_id: &str) -> Result<Option<Plant>, StoreError> {
        self.get_plant(plant_id)
    }

    /// Id of a listed plant other than `excluding` that carries `internal_code`.
    fn internal_code_owner(
        &mut self,
        internal_code: &str,
        excluding: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .list_plants(false)?
            .into_iter()
            .find(|p| p.id != excluding && p.internal_code.as_deref() == Some(internal_code))
            .map(|p| p.id))
    }

    /// Plants ordered by display name. Plants whose lifecycle is not listed
    /// (inactive, decommissioned) are skipped unless `include_inactive`.
    fn list_plants(&mut self, include_inactive: bool) -> Result<Vec<Plant>, StoreError>;

    /// Overwrite the telemetry of `plant_id`, creating the row when missing.
    ///
    /// Administrative fields are never touched, except the name when
    /// `update.name` is set. Returns `true` when the row was created.
    fn upsert_plant(
        &mut self,
        plant_id: &str,
        at: DateTime<Utc>,
        update: &TelemetryUpdate,
    ) -> Result<bool, StoreError>;

    fn append_reading(
        &mut self,
        plant_id: &str,
        at: DateTime<Utc>,
        telemetry: &Telemetry,
    ) -> Result<(), StoreError>;

    /// Readings of one plant inside `range`, ascending by timestamp, keeping
    /// at most the first `limit` rows.
    fn history(
        &mut self,
        plant_id: &str,
        range: &TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Reading>, StoreError>;

    /// Returns `false` when a plant with the same id already exists.
    fn insert_plant(&mut self, registration: &PlantRegistration) -> Result<bool, StoreError>;

    /// Returns `false` when no plant has this id.
    fn update_plant(&mut self, plant_id: &str, changes: &PlantChanges) -> Result<bool, StoreError>;
}

pub trait StoreTransaction: PlantStore {
    fn commit(self) -> Result<(), StoreError>;
}

pub trait Transactional: PlantStore {
    type Tx<'a>: StoreTransaction
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Tx<'_>, StoreError>;
}
