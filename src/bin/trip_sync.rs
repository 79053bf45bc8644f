use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tripsync::models::dates::parse_wire_date;
use tripsync::models::{Coordinate, CoverImage, EventCategory};
use tripsync::{
    CancelToken, NativeStore, NewEvent, NewTrip, NoopGeocoder, SyncConfig, SyncEngine,
    SyncOptions, TripsApiClient,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Sync trips and events with the trips backend", long_about = None)]
struct Args {
    /// Trips backend base URL
    #[arg(long, env = "TRIPSYNC_API_URL")]
    api_url: String,

    /// Bearer token for the backend
    #[arg(long, env = "TRIPSYNC_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// User whose trips are synced
    #[arg(long, env = "TRIPSYNC_USER_ID")]
    user_id: String,

    /// Local database file
    #[arg(long, env = "TRIPSYNC_DB_PATH", default_value = "tripsync.db")]
    db_path: String,

    /// Request timeout in seconds
    #[arg(long, env = "TRIPSYNC_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync cycle and print its report
    Sync,
    /// Print local trips with their events
    List,
    /// Create a trip locally
    AddTrip {
        #[arg(long)]
        name: String,
        #[arg(long)]
        cover_url: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Create an event locally
    AddEvent {
        /// Local id of the trip
        #[arg(long)]
        trip: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, requires = "longitude")]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude")]
        longitude: Option<f64>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a trip and its events, locally and on the server
    DeleteTrip {
        /// Local id of the trip
        id_local: String,
    },
    /// Delete an event, locally and on the server
    DeleteEvent {
        /// Local id of the event
        id_local: String,
    },
}

// Example usage:
// TRIPSYNC_API_URL=https://api.example.com TRIPSYNC_USER_ID=u1 TRIPSYNC_AUTH_TOKEN=... trip_sync sync
// trip_sync add-trip --name Paris --start 2024-05-01T00:00:00.000+00:00
// trip_sync add-event --trip <id_local> --name Louvre --latitude 48.8606 --longitude 2.3376
// trip_sync list

fn parse_date(flag: &str, raw: Option<String>) -> Result<Option<chrono::DateTime<chrono::Utc>>, String> {
    match raw {
        None => Ok(None),
        Some(raw) => parse_wire_date(&raw)
            .map(Some)
            .ok_or_else(|| format!("--{} is not a recognized date: {}", flag, raw)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(format!("tripsync={},trip_sync={}", args.log_level, args.log_level))
        .init();

    let config = SyncConfig::new(
        &args.api_url,
        args.auth_token,
        args.user_id,
        args.db_path,
        args.timeout_secs,
    )?;
    if config.auth_token.is_none() {
        warn!("No auth token configured, remote calls will fail");
    }

    let store = NativeStore::open(&config.db_path)?;
    let remote = TripsApiClient::new(&config)?;
    let engine = SyncEngine::new(
        Box::new(store),
        Arc::new(remote),
        Arc::new(NoopGeocoder),
        config.user_id.clone(),
        SyncOptions::default(),
    );

    match args.command {
        Command::Sync => {
            info!("🔄 Syncing trips of {} with {}", config.user_id, config.api_url);
            let cancel = CancelToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling sync");
                    on_interrupt.cancel();
                }
            });

            let report = engine.load_and_sync(&cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.failures.is_empty() {
                std::process::exit(2);
            }
        }
        Command::List => {
            let snapshot = engine.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::AddTrip {
            name,
            cover_url,
            start,
            end,
        } => {
            let trip = engine
                .create_trip(NewTrip {
                    name,
                    cover_image: cover_url.map(CoverImage::Url),
                    start_date: parse_date("start", start)?,
                    end_date: parse_date("end", end)?,
                    id: None,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&trip)?);
        }
        Command::AddEvent {
            trip,
            name,
            category,
            latitude,
            longitude,
            start,
            notes,
        } => {
            let Some(trip) = engine.with_store(|store| store.get_trip(&trip)).await? else {
                eprintln!("No trip with local id {}", trip);
                std::process::exit(1);
            };
            let coordinate = match (latitude, longitude) {
                (Some(latitude), Some(longitude)) => Some(Coordinate::new(latitude, longitude)),
                _ => None,
            };
            let event = engine
                .create_event(
                    &trip,
                    NewEvent {
                        name,
                        category: category
                            .as_deref()
                            .map(EventCategory::from)
                            .unwrap_or_default(),
                        coordinate,
                        start_date: parse_date("start", start)?,
                        notes,
                        ..Default::default()
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        Command::DeleteTrip { id_local } => {
            let Some(trip) = engine.with_store(|store| store.get_trip(&id_local)).await? else {
                eprintln!("No trip with local id {}", id_local);
                std::process::exit(1);
            };
            let outcome = engine.delete_trip(&trip).await?;
            if outcome.deleted_locally {
                info!("🗑️ Deleted trip {} ({:?})", id_local, outcome.remote);
            } else {
                eprintln!("Trip {} kept locally: {:?}", id_local, outcome.remote);
                std::process::exit(1);
            }
        }
        Command::DeleteEvent { id_local } => {
            let Some(event) = engine.with_store(|store| store.get_event(&id_local)).await? else {
                eprintln!("No event with local id {}", id_local);
                std::process::exit(1);
            };
            let outcome = engine.delete_event(&event).await?;
            info!(
                "🗑️ Event {} deleted locally: {} ({:?})",
                id_local, outcome.deleted_locally, outcome.remote
            );
        }
    }

    Ok(())
}
