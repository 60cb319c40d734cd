//! PSA Oxygen Plant Monitoring Service - HTTP daemon
//!
//! Accepts telemetry from plant controllers, keeps the current state of
//! every plant plus an append-only reading history in PostgreSQL, and
//! serves history, statistics and CSV exports to operator tools.
//!
//! Usage:
//!   cargo run --release                          # Serve on the configured port
//!   cargo run --release -- --port 9000           # Override the port
//!   cargo run --release -- --memory              # No database, in-memory store
//!   cargo run --release -- --config /etc/psamon.toml
//!
//! Environment:
//!   DATABASE_URL        - PostgreSQL connection string (required unless --memory)
//!   PSAMON_PORT         - Overrides [server].port
//!   PSAMON_API_KEY      - Overrides [server].api_key
//!   PSAMON_WEBHOOK_URL  - Overrides [notify].webhook_url
//!   RUST_LOG            - Log filter (default: info)

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use psamon_service::config::{ServiceConfig, DEFAULT_CONFIG_PATH};
use psamon_service::db;
use psamon_service::endpoint::{self, EndpointContext};
use psamon_service::notify::{AlarmNotifier, LogNotifier, WebhookNotifier};

#[derive(Parser, Debug)]
#[command(name = "psamon_service", about = "PSA oxygen plant telemetry service")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Listen port (overrides config and PSAMON_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// HTTP worker threads, each with its own database connection
    #[arg(long)]
    workers: Option<usize>,

    /// Keep everything in memory instead of PostgreSQL
    #[arg(long)]
    memory: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    println!("🫁 PSA Plant Monitoring Service");
    println!("===============================\n");

    let mut config = match ServiceConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = config.apply_env_overrides() {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(workers) = args.workers {
        config.server.workers = workers;
    }

    let ctx = EndpointContext {
        api_key: config.server.api_key.clone(),
        kpi: config.kpi.clone(),
        notifier: build_notifier(&config),
    };

    let result = if args.memory {
        println!("🧪 In-memory store (nothing is persisted)");
        println!("🌐 Listening on {}:{}\n", config.server.host, config.server.port);
        endpoint::serve_in_memory(&config.server, ctx)
    } else {
        println!("📊 Preparing database...");
        let db_url = match db::connect_and_initialize().and_then(|_| db::database_url()) {
            Ok(url) => url,
            Err(e) => {
                eprintln!("\n❌ Database setup failed: {}\n", e);
                process::exit(1);
            }
        };
        println!("✓ Schema ready");
        println!(
            "🌐 Listening on {}:{} with {} workers\n",
            config.server.host, config.server.port, config.server.workers
        );
        endpoint::start_endpoint_server(&config.server, &db_url, ctx)
    };

    if let Err(e) = result {
        error!(error = %e, "server stopped");
        eprintln!("\n❌ {}\n", e);
        process::exit(1);
    }
}

fn build_notifier(config: &ServiceConfig) -> Box<dyn AlarmNotifier> {
    let Some(url) = config.notify.webhook_url.as_deref() else {
        return Box::new(LogNotifier);
    };

    match WebhookNotifier::new(url, Duration::from_secs(config.notify.timeout_secs)) {
        Ok(notifier) => {
            println!("🔔 Alarm webhook: {}", url);
            Box::new(notifier)
        }
        Err(e) => {
            warn!(error = %e, "could not build webhook client, alarms will only be logged");
            Box::new(LogNotifier)
        }
    }
}
