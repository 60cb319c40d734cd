/// PostgreSQL-backed `PlantStore`.
///
/// Every query is written once against `postgres::GenericClient` so the
/// same SQL runs on a plain `Client` and inside a `Transaction`. Tables are
/// created by `db::initialize_schema`.

use chrono::{DateTime, Utc};
use postgres::types::ToSql;
use postgres::{Client, GenericClient, Row, Transaction};

use super::{PlantStore, StoreTransaction, Transactional};
use crate::admin::{PlantChanges, PlantRegistration};
use crate::error::StoreError;
use crate::model::{
    default_plant_name, InstallationType, LifecycleState, Plant, Reading, Telemetry,
    TelemetryUpdate,
};
use crate::window::TimeRange;

const PLANT_COLUMNS: &str = "id, name, internal_code, location, city, responsible, \
     contact_email, installation_type, nominal_capacity_nm3h, notes, lifecycle, \
     pressure_bar, temperature_c, purity_pct, flow_nm3h, operating_hours, mode, \
     alarm, alarm_message, last_updated, created_at";

const READING_COLUMNS: &str = "plant_id, recorded_at, pressure_bar, temperature_c, \
     purity_pct, flow_nm3h, mode, alarm, alarm_message, operating_hours";

// ---------------------------------------------------------------------------
// Store handles
// ---------------------------------------------------------------------------

/// Owns one connection. Not shared between threads; each endpoint worker
/// opens its own.
pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}

pub struct PgTransaction<'a> {
    tx: Transaction<'a>,
}

impl Transactional for PgStore {
    type Tx<'a> = PgTransaction<'a>;

    fn begin(&mut self) -> Result<Self::Tx<'_>, StoreError> {
        let tx = self.client.transaction()?;
        Ok(PgTransaction { tx })
    }
}

impl StoreTransaction for PgTransaction<'_> {
    fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }
}

impl PlantStore for PgStore {
    fn get_plant(&mut self, plant_id: &str) -> Result<Option<Plant>, StoreError> {
        select_plant(&mut self.client, plant_id)
    }

    fn lock_plant(&mut self, plant_id: &str) -> Result<Option<Plant>, StoreError> {
        lock_plant_id(&mut self.client, plant_id)?;
        select_plant(&mut self.client, plant_id)
    }

    fn internal_code_owner(
        &mut self,
        internal_code: &str,
        excluding: &str,
    ) -> Result<Option<String>, StoreError> {
        select_internal_code_owner(&mut self.client, internal_code, excluding)
    }

    fn list_plants(&mut self, include_inactive: bool) -> Result<Vec<Plant>, StoreError> {
        select_plants(&mut self.client, include_inactive)
    }

    fn upsert_plant(
        &mut self,
        plant_id: &str,
        at: DateTime<Utc>,
        update: &TelemetryUpdate,
    ) -> Result<bool, StoreError> {
        upsert_telemetry(&mut self.client, plant_id, at, update)
    }

    fn append_reading(
        &mut self,
        plant_id: &str,
        at: DateTime<Utc>,
        telemetry: &Telemetry,
    ) -> Result<(), StoreError> {
        insert_reading(&mut self.client, plant_id, at, telemetry)
    }

    fn history(
        &mut self,
        plant_id: &str,
        range: &TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Reading>, StoreError> {
        select_history(&mut self.client, plant_id, range, limit)
    }

    fn insert_plant(&mut self, registration: &PlantRegistration) -> Result<bool, StoreError> {
        insert_registered_plant(&mut self.client, registration)
    }

    fn update_plant(&mut self, plant_id: &str, changes: &PlantChanges) -> Result<bool, StoreError> {
        update_admin_fields(&mut self.client, plant_id, changes)
    }
}

impl PlantStore for PgTransaction<'_> {
    fn get_plant(&mut self, plant_id: &str) -> Result<Option<Plant>, StoreError> {
        select_plant(&mut self.tx, plant_id)
    }

    fn lock_plant(&mut self, plant_id: &str) -> Result<Option<Plant>, StoreError> {
        lock_plant_id(&mut self.tx, plant_id)?;
        select_plant(&mut self.tx, plant_id)
    }

    fn internal_code_owner(
        &mut self,
        internal_code: &str,
        excluding: &str,
    ) -> Result<Option<String>, StoreError> {
        select_internal_code_owner(&mut self.tx, internal_code, excluding)
    }

    fn list_plants(&mut self, include_inactive: bool) -> Result<Vec<Plant>, StoreError> {
        select_plants(&mut self.tx, include_inactive)
    }

    fn upsert_plant(
        &mut self,
        plant_id: &str,
        at: DateTime<Utc>,
        update: &TelemetryUpdate,
    ) -> Result<bool, StoreError> {
        upsert_telemetry(&mut self.tx, plant_id, at, update)
    }

    fn append_reading(
        &mut self,
        plant_id: &str,
        at: DateTime<Utc>,
        telemetry: &Telemetry,
    ) -> Result<(), StoreError> {
        insert_reading(&mut self.tx, plant_id, at, telemetry)
    }

    fn history(
        &mut self,
        plant_id: &str,
        range: &TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Reading>, StoreError> {
        select_history(&mut self.tx, plant_id, range, limit)
    }

    fn insert_plant(&mut self, registration: &PlantRegistration) -> Result<bool, StoreError> {
        insert_registered_plant(&mut self.tx, registration)
    }

    fn update_plant(&mut self, plant_id: &str, changes: &PlantChanges) -> Result<bool, StoreError> {
        update_admin_fields(&mut self.tx, plant_id, changes)
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn select_plant<C: GenericClient>(client: &mut C, plant_id: &str) -> Result<Option<Plant>, StoreError> {
    let sql = format!("SELECT {} FROM plants WHERE id = $1", PLANT_COLUMNS);
    let row = client.query_opt(sql.as_str(), &[&plant_id])?;
    row.as_ref().map(plant_from_row).transpose()
}

/// Transaction-scoped advisory lock on the plant id. Unlike `FOR UPDATE`
/// it also serializes callers racing to create the same plant. Outside a
/// transaction it is released at the end of the statement.
fn lock_plant_id<C: GenericClient>(client: &mut C, plant_id: &str) -> Result<(), StoreError> {
    client.execute("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)", &[&plant_id])?;
    Ok(())
}

fn select_internal_code_owner<C: GenericClient>(
    client: &mut C,
    internal_code: &str,
    excluding: &str,
) -> Result<Option<String>, StoreError> {
    let row = client.query_opt(
        "SELECT id FROM plants
         WHERE internal_code = $1 AND id <> $2
           AND lifecycle IN ('active', 'maintenance')
         ORDER BY id
         LIMIT 1",
        &[&internal_code, &excluding],
    )?;
    Ok(row.map(|r| r.get("id")))
}

fn select_plants<C: GenericClient>(client: &mut C, include_inactive: bool) -> Result<Vec<Plant>, StoreError> {
    let sql = if include_inactive {
        format!("SELECT {} FROM plants ORDER BY name, id", PLANT_COLUMNS)
    } else {
        format!(
            "SELECT {} FROM plants WHERE lifecycle IN ('active', 'maintenance') ORDER BY name, id",
            PLANT_COLUMNS
        )
    };
    let rows = client.query(sql.as_str(), &[])?;
    rows.iter().map(plant_from_row).collect()
}

/// Telemetry upsert. `xmax = 0` is only true for a freshly inserted row,
/// which is how the caller learns whether the plant was provisioned.
fn upsert_telemetry<C: GenericClient>(
    client: &mut C,
    plant_id: &str,
    at: DateTime<Utc>,
    update: &TelemetryUpdate,
) -> Result<bool, StoreError> {
    let insert_name = update
        .name
        .clone()
        .unwrap_or_else(|| default_plant_name(plant_id));
    let t = &update.telemetry;

    let row = client.query_one(
        "INSERT INTO plants
            (id, name, pressure_bar, temperature_c, purity_pct, flow_nm3h,
             operating_hours, mode, alarm, alarm_message, last_updated)
         VALUES ($1, $2, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (id) DO UPDATE SET
            name = COALESCE($3, plants.name),
            pressure_bar = EXCLUDED.pressure_bar,
            temperature_c = EXCLUDED.temperature_c,
            purity_pct = EXCLUDED.purity_pct,
            flow_nm3h = EXCLUDED.flow_nm3h,
            operating_hours = EXCLUDED.operating_hours,
            mode = EXCLUDED.mode,
            alarm = EXCLUDED.alarm,
            alarm_message = EXCLUDED.alarm_message,
            last_updated = EXCLUDED.last_updated,
            updated_at = now()
         RETURNING (xmax = 0) AS created",
        &[
            &plant_id,
            &insert_name,
            &update.name,
            &t.pressure_bar,
            &t.temperature_c,
            &t.purity_pct,
            &t.flow_nm3h,
            &t.operating_hours,
            &t.mode,
            &t.alarm,
            &t.alarm_message,
            &at,
        ],
    )?;

    Ok(row.get("created"))
}

fn insert_reading<C: GenericClient>(
    client: &mut C,
    plant_id: &str,
    at: DateTime<Utc>,
    t: &Telemetry,
) -> Result<(), StoreError> {
    client.execute(
        "INSERT INTO readings
            (plant_id, recorded_at, pressure_bar, temperature_c, purity_pct,
             flow_nm3h, mode, alarm, alarm_message, operating_hours)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        &[
            &plant_id,
            &at,
            &t.pressure_bar,
            &t.temperature_c,
            &t.purity_pct,
            &t.flow_nm3h,
            &t.mode,
            &t.alarm,
            &t.alarm_message,
            &t.operating_hours,
        ],
    )?;
    Ok(())
}

/// `LIMIT NULL` is "no limit" in PostgreSQL, so the same statement serves
/// both cases.
fn select_history<C: GenericClient>(
    client: &mut C,
    plant_id: &str,
    range: &TimeRange,
    limit: Option<usize>,
) -> Result<Vec<Reading>, StoreError> {
    let limit: Option<i64> = limit.map(|l| l as i64);
    let sql = format!(
        "SELECT {} FROM readings
         WHERE plant_id = $1
           AND ($2::timestamptz IS NULL OR recorded_at >= $2)
           AND ($3::timestamptz IS NULL OR recorded_at <= $3)
         ORDER BY recorded_at ASC, id ASC
         LIMIT $4",
        READING_COLUMNS
    );
    let rows = client.query(sql.as_str(), &[&plant_id, &range.from, &range.to, &limit])?;
    Ok(rows.iter().map(reading_from_row).collect())
}

fn insert_registered_plant<C: GenericClient>(
    client: &mut C,
    registration: &PlantRegistration,
) -> Result<bool, StoreError> {
    let inserted = client.execute(
        "INSERT INTO plants
            (id, name, internal_code, location, city, responsible, contact_email,
             installation_type, nominal_capacity_nm3h, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (id) DO NOTHING",
        &[
            &registration.id,
            &registration.name,
            &registration.internal_code,
            &registration.location,
            &registration.city,
            &registration.responsible,
            &registration.contact_email,
            &registration.installation_type.as_str(),
            &registration.nominal_capacity_nm3h,
            &registration.notes,
        ],
    )?;
    Ok(inserted == 1)
}

/// Builds the SET list from the allow-listed fields that are present.
fn update_admin_fields<C: GenericClient>(
    client: &mut C,
    plant_id: &str,
    changes: &PlantChanges,
) -> Result<bool, StoreError> {
    let installation = changes.installation_type.map(|t| t.as_str());
    let lifecycle = changes.lifecycle.map(|l| l.as_str());

    let mut sets: Vec<String> = Vec::new();
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

    fn push<'a>(
        sets: &mut Vec<String>,
        params: &mut Vec<&'a (dyn ToSql + Sync)>,
        column: &str,
        value: &'a (dyn ToSql + Sync),
    ) {
        params.push(value);
        sets.push(format!("{} = ${}", column, params.len()));
    }

    if let Some(v) = &changes.name {
        push(&mut sets, &mut params, "name", v);
    }
    if let Some(v) = &changes.internal_code {
        push(&mut sets, &mut params, "internal_code", v);
    }
    if let Some(v) = &changes.location {
        push(&mut sets, &mut params, "location", v);
    }
    if let Some(v) = &changes.city {
        push(&mut sets, &mut params, "city", v);
    }
    if let Some(v) = &changes.responsible {
        push(&mut sets, &mut params, "responsible", v);
    }
    if let Some(v) = &changes.contact_email {
        push(&mut sets, &mut params, "contact_email", v);
    }
    if let Some(v) = &installation {
        push(&mut sets, &mut params, "installation_type", v);
    }
    if let Some(v) = &changes.nominal_capacity_nm3h {
        push(&mut sets, &mut params, "nominal_capacity_nm3h", v);
    }
    if let Some(v) = &changes.notes {
        push(&mut sets, &mut params, "notes", v);
    }
    if let Some(v) = &lifecycle {
        push(&mut sets, &mut params, "lifecycle", v);
    }

    if sets.is_empty() {
        return Ok(select_plant(client, plant_id)?.is_some());
    }

    params.push(&plant_id);
    let sql = format!(
        "UPDATE plants SET {}, updated_at = now() WHERE id = ${}",
        sets.join(", "),
        params.len()
    );
    let updated = client.execute(sql.as_str(), &params)?;
    Ok(updated > 0)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn plant_from_row(row: &Row) -> Result<Plant, StoreError> {
    let installation: String = row.get("installation_type");
    let installation_type = InstallationType::parse(&installation)
        .ok_or_else(|| StoreError::InvalidRow(format!("installation_type '{}'", installation)))?;

    let lifecycle: String = row.get("lifecycle");
    let lifecycle = LifecycleState::parse(&lifecycle)
        .ok_or_else(|| StoreError::InvalidRow(format!("lifecycle '{}'", lifecycle)))?;

    Ok(Plant {
        id: row.get("id"),
        name: row.get("name"),
        internal_code: row.get("internal_code"),
        location: row.get("location"),
        city: row.get("city"),
        responsible: row.get("responsible"),
        contact_email: row.get("contact_email"),
        installation_type,
        nominal_capacity_nm3h: row.get("nominal_capacity_nm3h"),
        notes: row.get("notes"),
        lifecycle,
        telemetry: Telemetry {
            pressure_bar: row.get("pressure_bar"),
            temperature_c: row.get("temperature_c"),
            purity_pct: row.get("purity_pct"),
            flow_nm3h: row.get("flow_nm3h"),
            operating_hours: row.get("operating_hours"),
            mode: row.get("mode"),
            alarm: row.get("alarm"),
            alarm_message: row.get("alarm_message"),
        },
        last_updated: row.get("last_updated"),
        created_at: row.get("created_at"),
    })
}

fn reading_from_row(row: &Row) -> Reading {
    Reading {
        plant_id: row.get("plant_id"),
        recorded_at: row.get("recorded_at"),
        pressure_bar: row.get("pressure_bar"),
        temperature_c: row.get("temperature_c"),
        purity_pct: row.get("purity_pct"),
        flow_nm3h: row.get("flow_nm3h"),
        mode: row.get("mode"),
        alarm: row.get("alarm"),
        alarm_message: row.get("alarm_message"),
        operating_hours: row.get("operating_hours"),
    }
}
