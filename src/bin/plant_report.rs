//! Print an operating report for one plant, or a fleet overview.
//!
//! Usage:
//!   cargo run --bin plant_report -- --plant hospital_central --window 24h
//!   cargo run --bin plant_report                      # fleet overview
//!
//! KPI parameters come from the [kpi] table of the config file.
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use std::path::PathBuf;
use std::process;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use psamon_service::analysis::{global_stats, summarize_with, KpiSettings, MetricStats};
use psamon_service::config::{ServiceConfig, DEFAULT_CONFIG_PATH};
use psamon_service::db;
use psamon_service::store::{PgStore, PlantStore};
use psamon_service::window::{self, parse_relative, TimeRange};

#[derive(Parser, Debug)]
#[command(about = "Summarize PSA plant telemetry")]
struct Args {
    /// Plant id. Without it, prints the fleet overview.
    #[arg(long)]
    plant: Option<String>,

    /// Relative window ending now
    #[arg(long, default_value = "24h")]
    window: String,

    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let kpi = ServiceConfig::load(&args.config)?.kpi;
    let mut store = PgStore::new(db::connect_with_validation()?);

    match &args.plant {
        Some(plant_id) => plant_report(&mut store, plant_id.trim(), &args.window, &kpi),
        None => fleet_report(&mut store, &kpi),
    }
}

fn plant_report(
    store: &mut PgStore,
    plant_id: &str,
    window_arg: &str,
    kpi: &KpiSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let range = TimeRange::last(parse_relative(window_arg)?, Utc::now())?;
    let readings = window::history(store, plant_id, &range, None)?;
    let summary = summarize_with(&readings, kpi);

    let name = store
        .get_plant(plant_id)?
        .map(|p| p.name)
        .unwrap_or_else(|| plant_id.to_string());

    println!("🫁 {} - last {}", name, window_arg);
    println!("===============================\n");
    println!("📋 Readings: {}  (alarms: {})\n", summary.total_records, summary.alarm_count);

    print_metric("Purity (%)", &summary.purity);
    print_metric("Flow (Nm³/h)", &summary.flow);
    print_metric("Pressure (bar)", &summary.pressure);
    print_metric("Temperature (°C)", &summary.temperature);

    println!("\n⚙️  Modes:");
    for (mode, count) in &summary.mode_distribution {
        println!("   {:<14} {}", mode, count);
    }

    println!("\n📈 KPIs:");
    println!("   Availability:       {:.2}%", summary.kpis.availability_pct);
    println!(
        "   Purity ≥ {:.1}%:     {:.2}%",
        kpi.purity_threshold_pct, summary.kpis.purity_compliance_pct
    );
    Ok(())
}

fn print_metric(label: &str, stats: &MetricStats) {
    if stats.count == 0 {
        println!("   {:<18} no data", label);
        return;
    }
    println!(
        "   {:<18} min {:>8.2}  max {:>8.2}  avg {:>8.2}  std {:>6.2}  (n={})",
        label, stats.min, stats.max, stats.avg, stats.std, stats.count
    );
}

fn fleet_report(store: &mut PgStore, kpi: &KpiSettings) -> Result<(), Box<dyn std::error::Error>> {
    let fleet = global_stats(store, kpi)?;

    println!("🏥 Fleet overview");
    println!("=================\n");
    println!("   Plants:          {}", fleet.total);
    println!("   Producing:       {}", fleet.producing);
    println!("   In maintenance:  {}", fleet.in_maintenance);
    println!("   In alarm:        {}", fleet.alarming);
    println!("   Mean purity:     {:.2}%", fleet.mean_purity);
    println!("   Total flow:      {:.2} Nm³/h", fleet.total_flow);

    let alarming: Vec<_> = store
        .list_plants(false)?
        .into_iter()
        .filter(|p| p.telemetry.alarm)
        .collect();
    if !alarming.is_empty() {
        println!("\n🚨 Plants in alarm:");
        for plant in alarming {
            println!("   {} - {}", plant.name, plant.telemetry.alarm_message);
        }
    }
    Ok(())
}
