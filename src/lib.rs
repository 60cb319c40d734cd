/// psamon_service: telemetry and statistics for PSA medical oxygen plants.
///
/// # Module structure
///
/// ```text
/// psamon_service
/// ├── model     — shared data types (Plant, Telemetry, Reading, LifecycleState, …)
/// ├── error     — StoreError / MonitorError and their HTTP status mapping
/// ├── store
/// │   ├── pg     — PostgreSQL-backed plant + history store
/// │   └── memory — in-process store (tests, --memory)
/// ├── ingest
/// │   ├── payload  — lenient device payload decoding
/// │   └── fixtures (test only) — representative controller payloads
/// ├── admin     — plant registration, edits and soft deletion
/// ├── window    — time ranges, relative windows and history queries
/// ├── analysis
/// │   ├── stats — per-plant metric statistics and KPIs
/// │   └── fleet — cross-plant summary
/// ├── export    — CSV history export
/// ├── notify    — alarm notifications (log, webhook)
/// ├── config    — service configuration loader (psamon.toml)
/// ├── db        — connection setup and schema bootstrap
/// └── endpoint  — HTTP API
/// ```

/// Public modules
pub mod admin;
pub mod analysis;
pub mod config;
pub mod db;
pub mod endpoint;
pub mod error;
pub mod export;
pub mod ingest;
pub mod model;
pub mod notify;
pub mod store;
pub mod window;
