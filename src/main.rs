//! Irrigation Node - backend for a smart irrigation system

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use irrigation_node::{
    config::Args,
    db::MongoClient,
    logging,
    realtime::{FirebaseStateStore, MemoryStateStore, StateStore},
    server::{self, AppState},
    store::Stores,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Irrigation Node");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} (db {})", args.mongodb_uri, args.mongodb_db);
    info!("Report offset: {}", args.report_utc_offset);
    info!("Pump flow: {} L/min", args.pump_flow_lpm);
    info!("======================================");

    let offset = args.report_offset().map_err(anyhow::Error::msg)?;

    // MongoDB is optional in dev mode
    let (stores, storage) = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => (Stores::mongo(&client, offset).await?, "mongodb"),
        Err(e) if args.dev_mode => {
            warn!("MongoDB connection failed (dev mode, using in-memory stores): {}", e);
            (Stores::memory(offset), "memory")
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let realtime: Arc<dyn StateStore> = match &args.firebase_url {
        Some(url) => {
            info!("Realtime store: Firebase at {}", url);
            Arc::new(FirebaseStateStore::new(
                url,
                args.firebase_auth.clone(),
                Duration::from_millis(args.request_timeout_ms),
            ))
        }
        None => {
            warn!("FIREBASE_URL not set - switch states are kept in memory");
            Arc::new(MemoryStateStore::new())
        }
    };

    let state = Arc::new(AppState::new(args, stores, realtime, storage)?);
    server::run(state).await?;

    info!("Irrigation node stopped");
    Ok(())
}
