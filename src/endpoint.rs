/// HTTP endpoint for field devices and operator tools
///
/// JSON over HTTP on `tiny_http`. Routing is a pure function
/// (`route`: `ApiRequest` + store + context → `ApiResponse`) so the whole
/// API is testable against `MemoryStore` without opening a socket.
///
/// Endpoints:
/// - GET    /health                       - Service health check (no API key)
/// - POST   /api/readings                 - Ingest one reading
/// - POST   /api/readings/batch           - Ingest a JSON array of readings
/// - GET    /api/plants[?include_inactive=true]
/// - POST   /api/plants                   - Register a plant
/// - GET    /api/plants/{id}
/// - PATCH  /api/plants/{id}              - Edit administrative fields
/// - DELETE /api/plants/{id}              - Decommission (history is kept)
/// - GET    /api/history?plant_id&from&to&window&limit
/// - GET    /api/stats[?plant_id&from&to&window]
/// - GET    /api/export.csv[?plant_id|all&from&to&window]
///
/// `window` (e.g. `24h`, `7d`) takes precedence over `from`/`to`.
/// When an API key is configured, every route except `/health` requires it
/// in `X-API-Key` or the `api_key` query parameter.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tiny_http::{Header, Method, Server, StatusCode};
use tracing::{debug, error, info, warn};

use crate::admin::{self, PlantChanges, PlantRegistration};
use crate::analysis::{global_stats, summarize_with, KpiSettings};
use crate::config::ServerConfig;
use crate::db::{self, DbConfigError};
use crate::error::MonitorError;
use crate::export::history_csv;
use crate::ingest::{ingest, ingest_batch_json, BatchEntry};
use crate::notify::{announce_alarm, announce_plant_alarm, AlarmNotifier};
use crate::store::{MemoryStore, PgStore, PlantStore, Transactional};
use crate::window::{self, parse_relative, TimeRange};

const ROUTES: [&str; 11] = [
    "GET /health",
    "POST /api/readings",
    "POST /api/readings/batch",
    "GET /api/plants",
    "POST /api/plants",
    "GET /api/plants/{id}",
    "PATCH /api/plants/{id}",
    "DELETE /api/plants/{id}",
    "GET /api/history",
    "GET /api/stats",
    "GET /api/export.csv",
];

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Shared by every worker.
pub struct EndpointContext {
    pub api_key: Option<String>,
    pub kpi: KpiSettings,
    pub notifier: Box<dyn AlarmNotifier>,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Percent-decoded path without the query string.
    pub path: String,
    pub query: HashMap<String, String>,
    /// Value of the `X-API-Key` header.
    pub api_key: Option<String>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn new(method: Method, url: &str) -> Self {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        Self {
            method,
            path: decode(path),
            query: parse_query(query),
            api_key: None,
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Read method, URL, API key header and body from a live request.
    fn from_http(request: &mut tiny_http::Request) -> std::io::Result<Self> {
        let mut body = Vec::new();
        request.as_reader().read_to_end(&mut body)?;

        let api_key = request
            .headers()
            .iter()
            .find(|h| h.field.equiv("X-API-Key"))
            .map(|h| h.value.as_str().to_string());

        let mut api_request = ApiRequest::new(request.method().clone(), request.url());
        api_request.api_key = api_key;
        api_request.body = body;
        Ok(api_request)
    }

    /// Non-empty query parameter.
    fn param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    /// Sent as `Content-Disposition: attachment` when set.
    pub filename: Option<String>,
}

impl ApiResponse {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec_pretty(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
                filename: None,
            },
            Err(e) => {
                error!(error = %e, "failed to serialize response");
                Self::error(500, "Internal error")
            }
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: serde_json::json!({ "error": message }).to_string().into_bytes(),
            filename: None,
        }
    }

    fn from_error(e: &MonitorError) -> Self {
        match e {
            MonitorError::Store(inner) => error!(error = %inner, "store failure"),
            MonitorError::Export(inner) => error!(error = %inner, "csv export failed"),
            other => debug!(error = %other, "request rejected"),
        }
        Self::error(e.status_code(), &e.public_message())
    }

    fn into_http(self) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
        let mut response =
            tiny_http::Response::from_data(self.body).with_status_code(StatusCode(self.status));
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], self.content_type.as_bytes()) {
            response.add_header(header);
        }
        if let Some(filename) = self.filename {
            let value = format!("attachment; filename={}", filename);
            if let Ok(header) = Header::from_bytes(&b"Content-Disposition"[..], value.as_bytes()) {
                response.add_header(header);
            }
        }
        response
    }
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// Form encoding: `+` is a space in query strings only.
fn decode_query_part(s: &str) -> String {
    decode(&s.replace('+', " "))
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_query_part(key), decode_query_part(value))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

pub fn route<S: Transactional>(req: &ApiRequest, store: &mut S, ctx: &EndpointContext) -> ApiResponse {
    if req.path == "/health" {
        return handle_health();
    }
    if !authorized(req, ctx) {
        return ApiResponse::error(401, "Unauthorized");
    }
    dispatch(req, store, ctx).unwrap_or_else(|e| ApiResponse::from_error(&e))
}

fn authorized(req: &ApiRequest, ctx: &EndpointContext) -> bool {
    match &ctx.api_key {
        None => true,
        Some(expected) => req.api_key.as_deref().or(req.param("api_key")) == Some(expected.as_str()),
    }
}

fn dispatch<S: Transactional>(
    req: &ApiRequest,
    store: &mut S,
    ctx: &EndpointContext,
) -> Result<ApiResponse, MonitorError> {
    let segments: Vec<&str> = req.path.trim_matches('/').split('/').collect();

    match (&req.method, segments.as_slice()) {
        (Method::Post, ["api", "readings"]) => post_reading(req, store, ctx),
        (Method::Post, ["api", "readings", "batch"]) => post_batch(req, store, ctx),
        (Method::Get, ["api", "plants"]) => {
            let include_inactive = req.param("include_inactive") == Some("true");
            Ok(ApiResponse::json(200, &store.list_plants(include_inactive)?))
        }
        (Method::Post, ["api", "plants"]) => post_plant(req, store),
        (Method::Get, ["api", "plants", id]) => match store.get_plant(id)? {
            Some(plant) => Ok(ApiResponse::json(200, &plant)),
            None => Err(MonitorError::not_found(format!("plant '{}'", id))),
        },
        (Method::Patch | Method::Put, ["api", "plants", id]) => {
            let changes: PlantChanges = parse_body(req)?;
            Ok(ApiResponse::json(200, &admin::update_plant(store, id, &changes)?))
        }
        (Method::Delete, ["api", "plants", id]) => {
            Ok(ApiResponse::json(200, &admin::deactivate_plant(store, id)?))
        }
        (Method::Get, ["api", "history"]) => get_history(req, store),
        (Method::Get, ["api", "stats"]) => get_stats(req, store, ctx),
        (Method::Get, ["api", "export.csv"]) => get_export(req, store),
        (
            _,
            ["api", "readings"]
            | ["api", "readings", "batch"]
            | ["api", "plants"]
            | ["api", "plants", _]
            | ["api", "history"]
            | ["api", "stats"]
            | ["api", "export.csv"],
        ) => Ok(ApiResponse::error(405, "Method not allowed")),
        _ => Ok(ApiResponse::json(
            404,
            &serde_json::json!({ "error": "Not found", "available_endpoints": ROUTES }),
        )),
    }
}

/// Handle /health endpoint
fn handle_health() -> ApiResponse {
    ApiResponse::json(
        200,
        &serde_json::json!({
            "status": "ok",
            "service": "psamon_service",
            "version": env!("CARGO_PKG_VERSION")
        }),
    )
}

fn parse_body<T: serde::de::DeserializeOwned>(req: &ApiRequest) -> Result<T, MonitorError> {
    serde_json::from_slice(&req.body).map_err(|e| MonitorError::validation(format!("invalid JSON body: {}", e)))
}

fn post_reading<S: Transactional>(
    req: &ApiRequest,
    store: &mut S,
    ctx: &EndpointContext,
) -> Result<ApiResponse, MonitorError> {
    let entry = BatchEntry::from_json(parse_body(req)?)?;
    let outcome = ingest(store, entry.plant_id.as_deref(), &entry.reading)?;

    if let Err(e) = announce_alarm(store, ctx.notifier.as_ref(), &outcome) {
        warn!(plant_id = %outcome.plant_id, error = %e, "could not announce alarm");
    }

    Ok(ApiResponse::json(
        200,
        &serde_json::json!({
            "status": "ok",
            "plant_id": outcome.plant_id,
            "recorded_at": outcome.recorded_at,
            "created": outcome.created,
            "transitioned_to_alarm": outcome.transitioned_to_alarm,
        }),
    ))
}

fn post_batch<S: Transactional>(
    req: &ApiRequest,
    store: &mut S,
    ctx: &EndpointContext,
) -> Result<ApiResponse, MonitorError> {
    let values = match parse_body::<serde_json::Value>(req)? {
        serde_json::Value::Array(values) => values,
        _ => return Err(MonitorError::validation("expected a JSON array of readings")),
    };

    let report = ingest_batch_json(store, values);
    for plant_id in &report.new_alarms {
        if let Err(e) = announce_plant_alarm(store, ctx.notifier.as_ref(), plant_id) {
            warn!(plant_id = %plant_id, error = %e, "could not announce alarm");
        }
    }
    Ok(ApiResponse::json(200, &report))
}

fn post_plant<S: Transactional>(req: &ApiRequest, store: &mut S) -> Result<ApiResponse, MonitorError> {
    let registration: PlantRegistration = parse_body(req)?;
    let id = admin::register_plant(store, &registration)?;
    match store.get_plant(&id)? {
        Some(plant) => Ok(ApiResponse::json(201, &plant)),
        None => Err(MonitorError::not_found(format!("plant '{}'", id))),
    }
}

/// `window` wins over `from`/`to`.
fn requested_range(req: &ApiRequest) -> Result<TimeRange, MonitorError> {
    if let Some(window) = req.param("window") {
        return TimeRange::last(parse_relative(window)?, Utc::now());
    }
    TimeRange::parse(req.param("from"), req.param("to"))
}

fn required_plant_id(req: &ApiRequest) -> Result<&str, MonitorError> {
    req.param("plant_id")
        .ok_or_else(|| MonitorError::validation("plant_id is required"))
}

fn get_history<S: PlantStore>(req: &ApiRequest, store: &mut S) -> Result<ApiResponse, MonitorError> {
    let plant_id = required_plant_id(req)?;
    let range = requested_range(req)?;
    let limit = req
        .param("limit")
        .map(|l| {
            l.parse::<usize>()
                .map_err(|_| MonitorError::validation(format!("invalid limit '{}'", l)))
        })
        .transpose()?;

    let readings = window::history(store, plant_id, &range, limit)?;
    Ok(ApiResponse::json(
        200,
        &serde_json::json!({
            "plant_id": plant_id,
            "from": range.from,
            "to": range.to,
            "count": readings.len(),
            "readings": readings,
        }),
    ))
}

fn get_stats<S: PlantStore>(
    req: &ApiRequest,
    store: &mut S,
    ctx: &EndpointContext,
) -> Result<ApiResponse, MonitorError> {
    match req.param("plant_id") {
        Some(plant_id) => {
            let range = requested_range(req)?;
            let readings = window::history(store, plant_id, &range, None)?;
            let summary = summarize_with(&readings, &ctx.kpi);
            Ok(ApiResponse::json(
                200,
                &serde_json::json!({
                    "plant_id": plant_id,
                    "from": range.from,
                    "to": range.to,
                    "stats": summary,
                }),
            ))
        }
        None => Ok(ApiResponse::json(
            200,
            &serde_json::json!({ "fleet": global_stats(store, &ctx.kpi)? }),
        )),
    }
}

fn get_export<S: PlantStore>(req: &ApiRequest, store: &mut S) -> Result<ApiResponse, MonitorError> {
    let range = requested_range(req)?;
    let plant_id = req.param("plant_id").filter(|id| !id.eq_ignore_ascii_case("all"));

    let readings = match plant_id {
        Some(id) => window::history(store, id, &range, None)?,
        None => window::history_all(store, &range)?,
    };

    let csv = history_csv(&readings)?;

    Ok(ApiResponse {
        status: 200,
        content_type: "text/csv",
        body: csv.into_bytes(),
        filename: Some(format!(
            "history_{}_{}.csv",
            plant_id.unwrap_or("all"),
            Utc::now().format("%Y%m%d")
        )),
    })
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("failed to start HTTP server on {addr}: {message}")]
    Bind { addr: String, message: String },

    #[error(transparent)]
    Database(#[from] DbConfigError),
}

fn bind(config: &ServerConfig) -> Result<Server, EndpointError> {
    let addr = format!("{}:{}", config.host, config.port);
    let server = Server::http(&addr).map_err(|e| EndpointError::Bind {
        addr: addr.clone(),
        message: e.to_string(),
    })?;
    info!(addr = %addr, "HTTP endpoint listening");
    for r in ROUTES {
        debug!("  {}", r);
    }
    Ok(server)
}

/// Read, route and answer one request.
fn handle_request<S: Transactional>(mut request: tiny_http::Request, store: &mut S, ctx: &EndpointContext) {
    let response = match ApiRequest::from_http(&mut request) {
        Ok(api_request) => {
            let response = route(&api_request, store, ctx);
            debug!(method = %api_request.method, path = %api_request.path, status = response.status, "request handled");
            response
        }
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            ApiResponse::error(400, "Unreadable request body")
        }
    };

    if let Err(e) = request.respond(response.into_http()) {
        warn!(error = %e, "failed to send response");
    }
}

/// Serve on a pool of `config.workers` threads sharing one listener.
///
/// Every worker owns a PostgreSQL connection, opened before the listener
/// starts so that a bad `DATABASE_URL` fails startup instead of the first
/// request. A worker whose connection drops reconnects before its next
/// request.
pub fn start_endpoint_server(
    config: &ServerConfig,
    db_url: &str,
    ctx: EndpointContext,
) -> Result<(), EndpointError> {
    let workers = config.workers.max(1);
    let clients = (0..workers)
        .map(|_| db::connect_to(db_url))
        .collect::<Result<Vec<_>, _>>()?;

    if ctx.api_key.is_none() {
        warn!("no API key configured; the API is open to any client");
    }

    let server = Arc::new(bind(config)?);
    let ctx = Arc::new(ctx);
    let pool = threadpool::Builder::new()
        .num_threads(workers)
        .thread_name("psamon-http".to_string())
        .build();

    for client in clients {
        let server = Arc::clone(&server);
        let ctx = Arc::clone(&ctx);
        let db_url = db_url.to_string();
        pool.execute(move || pg_worker(&server, PgStore::new(client), &db_url, &ctx));
    }
    info!(workers, "endpoint workers started");

    pool.join();
    Ok(())
}

fn pg_worker(server: &Server, mut store: PgStore, db_url: &str, ctx: &EndpointContext) {
    loop {
        let request = match server.recv() {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "listener failed, stopping worker");
                return;
            }
        };

        if store.client_mut().is_closed() {
            match db::connect_to(db_url) {
                Ok(client) => {
                    warn!("database connection lost, reconnected");
                    store = PgStore::new(client);
                }
                Err(e) => error!(error = %e, "database reconnect failed"),
            }
        }

        handle_request(request, &mut store, ctx);
    }
}

/// Single-threaded server on an empty `MemoryStore`. Nothing is persisted.
pub fn serve_in_memory(config: &ServerConfig, ctx: EndpointContext) -> Result<(), EndpointError> {
    let server = bind(config)?;
    warn!("running with the in-memory store; data is lost on exit");
    if ctx.api_key.is_none() {
        warn!("no API key configured; the API is open to any client");
    }

    let mut store = MemoryStore::new();
    for request in server.incoming_requests() {
        handle_request(request, &mut store, &ctx);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
