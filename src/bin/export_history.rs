//! Export reading history to CSV.
//!
//! Writes the same columns as `GET /api/export.csv`, for one plant or for
//! every listed plant, to a file or to stdout.
//!
//! Usage:
//!   cargo run --bin export_history -- --plant hospital_central --window 7d
//!   cargo run --bin export_history -- --plant all --from 2024-05-01 --to 2024-05-31 --output may.csv
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use psamon_service::db;
use psamon_service::export::write_history_csv;
use psamon_service::store::PgStore;
use psamon_service::window::{self, parse_relative, TimeRange};

#[derive(Parser, Debug)]
#[command(about = "Export PSA plant reading history as CSV")]
struct Args {
    /// Plant id, or "all" for every listed plant
    #[arg(long, default_value = "all")]
    plant: String,

    /// Start of the range (YYYY-MM-DD or ISO 8601)
    #[arg(long)]
    from: Option<String>,

    /// End of the range (YYYY-MM-DD or ISO 8601)
    #[arg(long)]
    to: Option<String>,

    /// Relative window ending now, e.g. 24h or 7d (overrides --from/--to)
    #[arg(long)]
    window: Option<String>,

    /// Output file (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let range = match &args.window {
        Some(w) => TimeRange::last(parse_relative(w)?, Utc::now())?,
        None => TimeRange::parse(args.from.as_deref(), args.to.as_deref())?,
    };

    let mut store = PgStore::new(db::connect_with_validation()?);
    let readings = if args.plant.eq_ignore_ascii_case("all") {
        window::history_all(&mut store, &range)?
    } else {
        window::history(&mut store, args.plant.trim(), &range, None)?
    };

    match &args.output {
        Some(path) => {
            write_history_csv(&readings, File::create(path)?)?;
            eprintln!("✓ Wrote {} readings to {}", readings.len(), path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            write_history_csv(&readings, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}
