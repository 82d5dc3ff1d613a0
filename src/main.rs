//! River Level Forecast Service - Main Entry Point
//!
//! Fetches the full telemetry history of one ANA station, fits the rainfall
//! and level models, prints a summary of the forecast and anomalies, and
//! optionally exports the rows as CSV or keeps serving them over HTTP.
//!
//! Usage:
//!   cargo run --release                                # One run, print summary
//!   cargo run --release -- --horizon 30 --csv out.csv  # Export 30-day forecast
//!   cargo run --release -- --endpoint 8080             # Serve forecasts on port 8080
//!
//! Environment:
//!   FLOCAST_CONFIG - configuration file (default: station.toml)
//!   ANA_ENDPOINT   - override the telemetry service URL
//!   RUST_LOG       - log filter, overrides [logging].level

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;

use chrono::{Local, NaiveDate};
use clap::Parser;

use flocast_service::analysis::anomaly::anomaly_days;
use flocast_service::cache::{NoCache, ResultCache, SingleEntryCache};
use flocast_service::config::{self, ServiceConfig};
use flocast_service::endpoint::{self, MAX_HORIZON_DAYS};
use flocast_service::export;
use flocast_service::ingest::ana::AnaClient;
use flocast_service::logging;
use flocast_service::service::{ForecastService, History};

#[derive(Parser, Debug)]
#[command(name = "flocast")]
#[command(about = "River level forecasting from ANA telemetry")]
#[command(version)]
struct CliArgs {
    /// Configuration file (overrides FLOCAST_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Days to forecast beyond the history (1-365)
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_HORIZON_DAYS))]
    horizon: Option<i64>,

    /// Only report rows on or after this day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    plot_start: Option<NaiveDate>,

    /// Write the forecast rows to this CSV file
    #[arg(long, value_name = "PATH")]
    csv: Option<PathBuf>,

    /// Serve forecasts over HTTP on this port instead of exiting
    #[arg(long, value_name = "PORT")]
    endpoint: Option<u16>,

    /// Refetch telemetry on every request
    #[arg(long)]
    no_cache: bool,
}

fn main() {
    let args = CliArgs::parse();

    let config = match config::load_from_env(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            process::exit(1);
        }
    };
    logging::init(&config.logging);

    println!("🌊 River Level Forecast Service");
    println!("================================\n");
    println!("📍 Station {} - {}", config.station.code, config.station.name);
    println!("   Telemetry: {}\n", config.telemetry.endpoint);

    let client = match AnaClient::new(&config.telemetry) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("❌ Failed to create telemetry client: {}", e);
            process::exit(1);
        }
    };

    let result = if args.no_cache {
        run(&args, &config, ForecastService::new(&config, client, NoCache))
    } else {
        run(&args, &config, ForecastService::new(&config, client, SingleEntryCache::new()))
    };

    if let Err(message) = result {
        eprintln!("\n❌ {}\n", message);
        process::exit(1);
    }
}

fn run<C>(
    args: &CliArgs,
    config: &ServiceConfig,
    service: ForecastService<AnaClient, C>,
) -> Result<(), String>
where
    C: ResultCache<NaiveDate, History>,
{
    if let Some(port) = args.endpoint {
        return endpoint::start_endpoint_server(port, &service);
    }

    let today = Local::now().date_naive();
    let horizon = args.horizon.unwrap_or(config.forecast.horizon_days);

    println!("📊 Fetching history {} → {} and fitting models...", config.station.history_start, today);
    let forecast = service.run(today, horizon).map_err(|e| format!("Forecast failed: {}", e))?;
    println!("✓ Forecast complete\n");

    let rows = export::filter_from(&forecast.observations, args.plot_start);
    let history_days = forecast.observations.len() - forecast.horizon.len();

    println!("📋 Summary");
    println!("   History days:         {}", history_days);
    match (forecast.horizon.first(), forecast.horizon.last()) {
        (Some(first), Some(last)) => println!("   Horizon:              {} → {} ({} days)", first, last, forecast.horizon.len()),
        _ => println!("   Horizon:              none"),
    }
    println!("   Rainfall coefficient: {:+.4}", forecast.rainfall_coefficient);
    println!("   Anomalies:            {}", forecast.anomaly_count);

    let anomalies = anomaly_days(&rows);
    if !anomalies.is_empty() {
        println!("\n⚠️  Level above forecast upper bound on:");
        for day in anomalies.iter().rev().take(10) {
            println!("   {}", day);
        }
        if anomalies.len() > 10 {
            println!("   ... and {} earlier", anomalies.len() - 10);
        }
    }

    if let Some(path) = &args.csv {
        let file = File::create(path).map_err(|e| format!("Cannot create {}: {}", path.display(), e))?;
        export::write_csv(BufWriter::new(file), &rows)
            .map_err(|e| format!("CSV export to {} failed: {}", path.display(), e))?;
        println!("\n💾 Wrote {} rows to {}", rows.len(), path.display());
    }

    Ok(())
}
