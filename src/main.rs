//! ibops - multi-tenant business operations service

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ibops::{
    config::{Args, LogFormat},
    db::{MongoClient, Stores},
    logging::AuditLogger,
    server::{self, AppState},
};

/// How often expired signup sessions are swept
const SIGNUP_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ibops={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    match args.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  ibops {}", env!("CARGO_PKG_VERSION"));
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB database: {}", args.mongodb_db);
    info!("======================================");

    // MongoDB is optional in dev mode only
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => Some(client),
        Err(e) if args.dev_mode => {
            warn!("MongoDB unavailable (dev mode, using in-memory store): {}", e);
            None
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };
    let stores = match &mongo {
        Some(client) => Stores::mongo(client).await?,
        None => Stores::memory(),
    };

    let audit = AuditLogger::new();
    if let Some(path) = &args.audit_log_path {
        if let Err(e) = audit.init_file(path.clone()).await {
            warn!("Audit file {} unavailable, logging to tracing only: {}", path.display(), e);
        }
    }

    let state = Arc::new(AppState::new(args.clone(), stores, mongo, audit)?);
    Arc::clone(&state.signups).spawn_sweeper(SIGNUP_SWEEP_INTERVAL);

    if let (Some(email), Some(password)) = (&args.super_admin_email, &args.super_admin_password) {
        match state.accounts.bootstrap_super_admin(email, password).await? {
            Some(user) => info!(user_id = %user.id, "Bootstrap super-admin created"),
            None => info!("Bootstrap super-admin already present"),
        }
    }

    server::run(state).await?;
    Ok(())
}
