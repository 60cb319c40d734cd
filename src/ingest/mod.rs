/// Ingestion Reducer: folds one device reading into the plant's current row
/// and the history table.
///
/// Each `ingest` runs inside one store transaction: read the previous alarm
/// flag, upsert the plant, append the history row, commit. If any step fails
/// the transaction is dropped and both writes are rolled back.
///
/// The reducer only signals the alarm edge (`transitioned_to_alarm`); the
/// caller decides whether to notify (see `notify::announce_alarm`).

pub mod payload;

#[cfg(test)]
pub(crate) mod fixtures;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::MonitorError;
use crate::store::{PlantStore, StoreTransaction, Transactional};

pub use payload::{BatchEntry, ReadingPayload};

/// Result of a successful `ingest`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub plant_id: String,
    pub recorded_at: DateTime<Utc>,
    /// The plant row did not exist before this reading.
    pub created: bool,
    /// Alarm went from false (or no previous reading) to true.
    pub transitioned_to_alarm: bool,
}

/// Ingest a reading stamped with the current time.
pub fn ingest<S: Transactional>(
    store: &mut S,
    plant_id: Option<&str>,
    reading: &ReadingPayload,
) -> Result<IngestOutcome, MonitorError> {
    ingest_at(store, plant_id, reading, Utc::now())
}

/// Ingest a reading stamped with `at`.
///
/// The timestamp is truncated to microseconds so that the value handed back
/// in `IngestOutcome` is exactly what PostgreSQL stores.
pub fn ingest_at<S: Transactional>(
    store: &mut S,
    plant_id: Option<&str>,
    reading: &ReadingPayload,
    at: DateTime<Utc>,
) -> Result<IngestOutcome, MonitorError> {
    let plant_id = plant_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| MonitorError::validation("plant_id is required"))?;
    let update = reading.resolve()?;
    let at = at.trunc_subsecs(6);

    let mut tx = store.begin()?;
    // Held until commit so concurrent readings see each other's alarm flag.
    let was_alarming = tx
        .lock_plant(plant_id)?
        .is_some_and(|plant| plant.telemetry.alarm);
    let created = tx.upsert_plant(plant_id, at, &update)?;
    tx.append_reading(plant_id, at, &update.telemetry)?;
    tx.commit()?;

    let transitioned_to_alarm = !was_alarming && update.telemetry.alarm;

    debug!(
        plant_id,
        purity_pct = update.telemetry.purity_pct,
        mode = %update.telemetry.mode,
        alarm = update.telemetry.alarm,
        "reading ingested"
    );
    if created {
        info!(plant_id, "new plant provisioned from first reading");
    }
    if transitioned_to_alarm {
        info!(plant_id, message = %update.telemetry.alarm_message, "plant entered alarm");
    }

    Ok(IngestOutcome {
        plant_id: plant_id.to_string(),
        recorded_at: at,
        created,
        transitioned_to_alarm,
    })
}

// ---------------------------------------------------------------------------
// Batch ingestion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchError {
    pub plant_id: Option<String>,
    pub message: String,
}

/// Outcome of a batch. Never an error: failed items are listed in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub errors: Vec<BatchError>,
    /// Plants whose alarm edge fired during this batch, in batch order.
    pub new_alarms: Vec<String>,
}

impl BatchReport {
    fn record(&mut self, plant_id: Option<&str>, result: Result<IngestOutcome, MonitorError>) {
        match result {
            Ok(outcome) => {
                self.processed += 1;
                if outcome.transitioned_to_alarm {
                    self.new_alarms.push(outcome.plant_id);
                }
            }
            Err(e) => {
                warn!(plant_id = plant_id.unwrap_or("<missing>"), error = %e, "batch item rejected");
                self.errors.push(BatchError {
                    plant_id: plant_id.map(str::to_string),
                    message: e.public_message(),
                });
            }
        }
    }
}

/// Apply `ingest` to every entry independently.
pub fn ingest_batch<S: Transactional>(store: &mut S, entries: &[BatchEntry]) -> BatchReport {
    let mut report = BatchReport::default();
    for entry in entries {
        let plant_id = entry.plant_id.as_deref();
        report.record(plant_id, ingest(store, plant_id, &entry.reading));
    }
    info!(
        processed = report.processed,
        errors = report.errors.len(),
        "batch ingested"
    );
    report
}

/// Like `ingest_batch`, but elements that are not valid reading objects are
/// recorded as per-item errors instead of failing the whole request.
pub fn ingest_batch_json<S: Transactional>(store: &mut S, values: Vec<serde_json::Value>) -> BatchReport {
    let mut report = BatchReport::default();
    for value in values {
        let raw_id = value
            .get("plant_id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let result = BatchEntry::from_json(value)
            .and_then(|entry| ingest(store, entry.plant_id.as_deref(), &entry.reading));
        report.record(raw_id.as_deref(), result);
    }
    info!(
        processed = report.processed,
        errors = report.errors.len(),
        "batch ingested"
    );
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::admin::{PlantChanges, PlantRegistration};
    use crate::error::StoreError;
    use crate::model::{Plant, Reading, Telemetry, TelemetryUpdate};
    use crate::store::MemoryStore;
    use crate::window::TimeRange;
    use chrono::TimeZone;

    fn parse(json: &str) -> BatchEntry {
        serde_json::from_str(json).expect("fixture should parse")
    }

    fn alarm(on: bool) -> ReadingPayload {
        ReadingPayload {
            alarm: Some(on),
            ..ReadingPayload::default()
        }
    }

    #[test]
    fn test_ingest_then_get_plant_reflects_reading() {
        let mut store = MemoryStore::new();
        let entry = parse(fixture_production_reading_json());

        let outcome = ingest(&mut store, entry.plant_id.as_deref(), &entry.reading).unwrap();
        assert!(outcome.created);
        assert!(!outcome.transitioned_to_alarm);

        let plant = store.get_plant("hospital_central").unwrap().expect("plant should exist");
        assert_eq!(plant.telemetry.pressure_bar, 6.1);
        assert_eq!(plant.telemetry.purity_pct, 94.8);
        assert_eq!(plant.telemetry.operating_hours, 15230.0);
        assert_eq!(plant.telemetry.mode, "Production");
        assert_eq!(plant.last_updated, Some(outcome.recorded_at));
        assert_eq!(plant.name, "Plant hospital_central");
    }

    #[test]
    fn test_missing_plant_id_is_validation_error() {
        let mut store = MemoryStore::new();
        for id in [None, Some(""), Some("   ")] {
            let err = ingest(&mut store, id, &ReadingPayload::default()).unwrap_err();
            assert!(matches!(err, MonitorError::Validation(_)), "{:?} should be rejected", id);
        }
        assert_eq!(store.reading_count(), 0);
    }

    #[test]
    fn test_history_grows_by_one_per_ingest() {
        let mut store = MemoryStore::new();
        for expected in 1..=4 {
            ingest(&mut store, Some("norte"), &ReadingPayload::default()).unwrap();
            let rows = store.history("norte", &TimeRange::unbounded(), None).unwrap();
            assert_eq!(rows.len(), expected);
        }
    }

    #[test]
    fn test_alarm_edge_only_fires_on_false_to_true() {
        let mut store = MemoryStore::new();
        let edges: Vec<bool> = [false, true, true, false, true]
            .into_iter()
            .map(|on| {
                ingest(&mut store, Some("norte"), &alarm(on))
                    .unwrap()
                    .transitioned_to_alarm
            })
            .collect();
        assert_eq!(edges, vec![false, true, false, false, true]);
    }

    #[test]
    fn test_first_reading_in_alarm_is_an_edge() {
        let mut store = MemoryStore::new();
        let outcome = ingest(&mut store, Some("norte"), &alarm(true)).unwrap();
        assert!(outcome.transitioned_to_alarm);
    }

    #[test]
    fn test_registered_name_survives_ingest() {
        let mut store = MemoryStore::new();
        crate::admin::register_plant(
            &mut store,
            &PlantRegistration {
                id: "norte".to_string(),
                name: "Hospital Norte".to_string(),
                location: "Block C".to_string(),
                ..PlantRegistration::default()
            },
        )
        .unwrap();

        let outcome = ingest(&mut store, Some("norte"), &ReadingPayload::default()).unwrap();
        assert!(!outcome.created);
        let plant = store.get_plant("norte").unwrap().unwrap();
        assert_eq!(plant.name, "Hospital Norte");
        assert_eq!(plant.location, "Block C");

        let renamed = ReadingPayload {
            name: Some("Norte II".to_string()),
            ..ReadingPayload::default()
        };
        ingest(&mut store, Some("norte"), &renamed).unwrap();
        assert_eq!(store.get_plant("norte").unwrap().unwrap().name, "Norte II");
    }

    #[test]
    fn test_timestamp_is_truncated_to_microseconds() {
        let mut store = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let outcome = ingest_at(&mut store, Some("norte"), &ReadingPayload::default(), at).unwrap();
        assert_eq!(outcome.recorded_at.timestamp_subsec_nanos(), 123_456_000);

        let rows = store.history("norte", &TimeRange::unbounded(), None).unwrap();
        assert_eq!(rows[0].recorded_at, outcome.recorded_at);
    }

    #[test]
    fn test_batch_with_missing_plant_id() {
        let mut store = MemoryStore::new();
        let values: Vec<serde_json::Value> =
            serde_json::from_str(fixture_batch_missing_plant_json()).unwrap();

        let report = ingest_batch_json(&mut store, values);
        assert_eq!(report.processed, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].plant_id, None);
        assert!(store.get_plant("norte").unwrap().is_some());
        assert!(store.get_plant("sur").unwrap().is_some());
    }

    #[test]
    fn test_batch_collects_malformed_items_and_alarms() {
        let mut store = MemoryStore::new();
        let values = vec![
            serde_json::json!({ "plant_id": "a", "alarm": true }),
            serde_json::json!("not an object"),
            serde_json::json!({ "plant_id": "b", "purity_pct": "n/a" }),
            serde_json::json!({ "plant_id": "a", "alarm": true }),
        ];

        let report = ingest_batch_json(&mut store, values);
        assert_eq!(report.processed, 2);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[1].plant_id.as_deref(), Some("b"));
        assert_eq!(report.new_alarms, vec!["a".to_string()]);
    }

    #[test]
    fn test_typed_batch() {
        let mut store = MemoryStore::new();
        let entries = vec![
            BatchEntry::new("a", ReadingPayload::default()),
            BatchEntry::default(),
            BatchEntry::new("b", alarm(true)),
        ];
        let report = ingest_batch(&mut store, &entries);
        assert_eq!(report.processed, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.new_alarms, vec!["b".to_string()]);
    }

    // -----------------------------------------------------------------------
    // Rollback
    // -----------------------------------------------------------------------

    /// MemoryStore whose history appends always fail.
    struct BrokenHistory(MemoryStore);

    struct BrokenTx<'a>(crate::store::memory::MemoryTransaction<'a>);

    macro_rules! delegate_reads {
        () => {
            fn get_plant(&mut self, plant_id: &str) -> Result<Option<Plant>, StoreError> {
                self.0.get_plant(plant_id)
            }
            fn list_plants(&mut self, include_inactive: bool) -> Result<Vec<Plant>, StoreError> {
                self.0.list_plants(include_inactive)
            }
            fn upsert_plant(
                &mut self,
                plant_id: &str,
                at: DateTime<Utc>,
                update: &TelemetryUpdate,
            ) -> Result<bool, StoreError> {
                self.0.upsert_plant(plant_id, at, update)
            }
            fn append_reading(&mut self, _: &str, _: DateTime<Utc>, _: &Telemetry) -> Result<(), StoreError> {
                Err(StoreError::InvalidRow("history table unavailable".to_string()))
            }
            fn history(
                &mut self,
                plant_id: &str,
                range: &TimeRange,
                limit: Option<usize>,
            ) -> Result<Vec<Reading>, StoreError> {
                self.0.history(plant_id, range, limit)
            }
            fn insert_plant(&mut self, registration: &PlantRegistration) -> Result<bool, StoreError> {
                self.0.insert_plant(registration)
            }
            fn update_plant(&mut self, plant_id: &str, changes: &PlantChanges) -> Result<bool, StoreError> {
                self.0.update_plant(plant_id, changes)
            }
        };
    }

    impl PlantStore for BrokenHistory {
        delegate_reads!();
    }

    impl PlantStore for BrokenTx<'_> {
        delegate_reads!();
    }

    impl StoreTransaction for BrokenTx<'_> {
        fn commit(self) -> Result<(), StoreError> {
            self.0.commit()
        }
    }

    impl Transactional for BrokenHistory {
        type Tx<'a> = BrokenTx<'a>;

        fn begin(&mut self) -> Result<Self::Tx<'_>, StoreError> {
            Ok(BrokenTx(self.0.begin()?))
        }
    }

    #[test]
    fn test_failed_append_rolls_back_upsert() {
        let mut inner = MemoryStore::new();
        ingest(&mut inner, Some("norte"), &alarm(false)).unwrap();
        let before = inner.get_plant("norte").unwrap().unwrap();

        let mut store = BrokenHistory(inner);
        let err = ingest(&mut store, Some("norte"), &alarm(true)).unwrap_err();
        assert!(matches!(err, MonitorError::Store(_)));

        let err = ingest(&mut store, Some("nuevo"), &ReadingPayload::default()).unwrap_err();
        assert!(matches!(err, MonitorError::Store(_)));

        let BrokenHistory(mut inner) = store;
        assert_eq!(inner.get_plant("norte").unwrap().unwrap(), before);
        assert!(inner.get_plant("nuevo").unwrap().is_none());
        assert_eq!(inner.reading_count(), 1);
    }
}
