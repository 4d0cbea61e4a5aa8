mod analyzer;
mod config;
mod model;
mod nightscout;
mod storage;
mod units;

use chrono::{Duration, NaiveDate, NaiveTime, Timelike, Utc};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use analyzer::{Analyzer, GlucoseAnalyzer};
use config::AppConfig;
use model::{AppError, DayReading, DayReadings, Reading, RefreshSummary};
use nightscout::{EntrySource, NightscoutClient};
use storage::SqliteStorage;
use units::{Thresholds, Unit};

/// Page size for backfill requests against the entries endpoint.
const PAGE_SIZE: u32 = 10_000;

/// Batch size for the `current` command. More than one entry so duplicate
/// timestamps from overlapping uploaders resolve deterministically.
const CURRENT_BATCH: u32 = 10;

#[derive(Parser)]
#[command(name = "cgm", version, about = "Nightscout CGM data fetcher and analyzer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get the latest glucose reading
    Current,

    /// Analyze cached CGM data
    Analyze {
        /// Number of days to analyze
        #[arg(long, default_value_t = 90)]
        days: i64,
    },

    /// Fetch latest data from Nightscout and update the local cache
    Refresh {
        /// Days of data to fetch
        #[arg(long, default_value_t = 90)]
        days: i64,
    },

    /// Show readings for a single day
    Day {
        /// today, yesterday, or YYYY-MM-DD
        #[arg(default_value = "today")]
        date: String,

        /// Only include readings at or after this UTC hour (0-23)
        #[arg(long)]
        from_hour: Option<u32>,

        /// Only include readings up to and including this UTC hour
        #[arg(long)]
        to_hour: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the JSON result.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command).await {
        Ok(body) => println!("{body}"),
        Err(e) => {
            let body = serde_json::json!({ "error": e.to_string() });
            println!("{body:#}");
            std::process::exit(1);
        }
    }
}

async fn run(command: Commands) -> Result<String, AppError> {
    let config = AppConfig::from_env()?;
    let analyzer = GlucoseAnalyzer::new();

    match command {
        Commands::Current => {
            let client = NightscoutClient::new(&config)?;
            let (thresholds, unit) = server_preferences(&client).await;
            let entries = client.fetch_entries(CURRENT_BATCH, None).await?;
            let readings: Vec<Reading> = entries.iter().filter_map(Reading::from_entry).collect();
            let current = analyzer.current(&readings, &thresholds, unit)?;
            Ok(serde_json::to_string_pretty(&current)?)
        }
        Commands::Analyze { days } => {
            let storage = SqliteStorage::new(&config.db_path)?;
            let client = NightscoutClient::new(&config)?;
            let (thresholds, unit) = server_preferences(&client).await;
            let cutoff_ms = (Utc::now() - Duration::days(days)).timestamp_millis();
            let readings = storage.readings_since(cutoff_ms)?;
            let result = analyzer.analyze(&readings, days, &thresholds, unit)?;
            Ok(serde_json::to_string_pretty(&result)?)
        }
        Commands::Refresh { days } => {
            let storage = SqliteStorage::new(&config.db_path)?;
            let client = NightscoutClient::new(&config)?;
            let summary = refresh_window(&client, &storage, days, &config.db_path).await?;
            Ok(serde_json::to_string_pretty(&summary)?)
        }
        Commands::Day {
            date,
            from_hour,
            to_hour,
        } => {
            let storage = SqliteStorage::new(&config.db_path)?;
            let client = NightscoutClient::new(&config)?;
            let (thresholds, unit) = server_preferences(&client).await;
            let day = parse_date_arg(&date)?;
            let view = day_view(&storage, day, from_hour, to_hour, &thresholds, unit)?;
            Ok(serde_json::to_string_pretty(&view)?)
        }
    }
}

/// Display unit and thresholds from the server, falling back to defaults
/// when the status endpoint is unreachable.
async fn server_preferences(source: &dyn EntrySource) -> (Thresholds, Unit) {
    match source.fetch_settings().await {
        Ok(settings) => (
            Thresholds::from_settings(&settings),
            Unit::from_settings(&settings),
        ),
        Err(e) => {
            warn!("settings fetch failed, using defaults: {e}");
            (Thresholds::default(), Unit::default())
        }
    }
}

/// Pages backwards through the entries endpoint until the window is covered,
/// caching SGV entries that are not already stored.
async fn refresh_window(
    source: &dyn EntrySource,
    storage: &SqliteStorage,
    days: i64,
    db_path: &str,
) -> Result<RefreshSummary, AppError> {
    let cutoff_ms = (Utc::now() - Duration::days(days)).timestamp_millis();
    let mut new_readings = 0usize;
    let mut older_than: Option<i64> = None;

    loop {
        let entries = source.fetch_entries(PAGE_SIZE, older_than).await?;
        if entries.is_empty() {
            break;
        }

        for entry in entries.iter().filter(|e| e.is_sgv()) {
            if storage.insert_entry(entry)? {
                new_readings += 1;
            }
        }

        let oldest = entries.iter().filter_map(|e| e.date).min();
        match oldest {
            Some(oldest) if oldest >= cutoff_ms => {
                debug!("page covered down to {oldest}, continuing backfill");
                older_than = Some(oldest - 1);
            }
            _ => break,
        }
    }

    info!("refresh complete: {new_readings} new readings");
    Ok(RefreshSummary {
        status: "success".to_string(),
        new_readings,
        total_readings: storage.count_readings()?,
        database: db_path.to_string(),
    })
}

fn parse_date_arg(arg: &str) -> Result<NaiveDate, AppError> {
    let trimmed = arg.trim();
    match trimmed.to_lowercase().as_str() {
        "today" => Ok(Utc::now().date_naive()),
        "yesterday" => Ok((Utc::now() - Duration::days(1)).date_naive()),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
            .map_err(|_| AppError::InvalidDate(trimmed.to_string())),
    }
}

fn day_view(
    storage: &SqliteStorage,
    date: NaiveDate,
    from_hour: Option<u32>,
    to_hour: Option<u32>,
    thresholds: &Thresholds,
    unit: Unit,
) -> Result<DayReadings, AppError> {
    let start_ms = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    let end_ms = start_ms + 24 * 3_600_000;

    let readings = storage.readings_between(start_ms, end_ms)?;
    let rows = readings
        .iter()
        .filter(|r| {
            let hour = r.timestamp.hour();
            from_hour.is_none_or(|from| hour >= from) && to_hour.is_none_or(|to| hour <= to)
        })
        .map(|r| DayReading {
            time: r.timestamp.format("%H:%M").to_string(),
            glucose: unit.convert(r.glucose_mg_dl as f64),
            trend: r.trend,
            status: thresholds.status(r.glucose_mg_dl),
        })
        .collect();

    Ok(DayReadings {
        date: date.format("%Y-%m-%d").to_string(),
        readings: rows,
        unit: unit.label().to_string(),
    })
}
