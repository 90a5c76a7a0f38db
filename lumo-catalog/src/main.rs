//! lumo-catalog - Course Catalog Aggregation Service
//!
//! Ingests course, seat, organization, and program data from the upstream
//! platforms, reconciles it into the canonical catalog store, and serves
//! an operational surface (health, refresh trigger, SSE change feed).

use anyhow::Result;
use clap::Parser;
use lumo_catalog::cache::ResponseCache;
use lumo_catalog::upstream::{RetryPolicy, UpstreamClient};
use lumo_catalog::{editorial, pipeline, store, AppState};
use lumo_common::config::CatalogConfig;
use lumo_common::events::EventBus;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How often the scheduled publisher and the republish sweep run
const PUBLISHER_INTERVAL_SECONDS: u64 = 300;

#[derive(Debug, Parser)]
#[command(name = "lumo-catalog", about = "Course catalog aggregation service")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "LUMO_CONFIG")]
    config: Option<PathBuf>,

    /// Refresh this partner's catalog once and exit instead of serving
    #[arg(long)]
    refresh_partner: Option<String>,

    /// Run loaders on the worker pool (overrides the config file)
    #[arg(long)]
    parallel: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = CatalogConfig::load(cli.config.as_deref())?;
    if cli.parallel {
        config.parallel = true;
    }

    info!("Starting lumo-catalog");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db = lumo_common::db::init_pool(&db_path).await?;
    store::init_schema(&db).await?;

    let bus = EventBus::new(1000);
    let cache = ResponseCache::new();

    if let Some(partner_code) = cli.refresh_partner {
        return one_shot_refresh(&db, &bus, &cache, &config, &partner_code).await;
    }

    // Outside ingest, any record change invalidates the response cache
    spawn_cache_invalidator(&bus, &cache);
    spawn_publisher(&db, &bus);

    let state = AppState::new(db, bus, cache, config.clone());
    let app = lumo_catalog::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on http://{}", config.bind_address);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Refresh one partner and exit non-zero on failure
async fn one_shot_refresh(
    db: &sqlx::SqlitePool,
    bus: &EventBus,
    cache: &ResponseCache,
    config: &CatalogConfig,
    partner_code: &str,
) -> Result<()> {
    let partner = store::partners::get_by_code(db, partner_code)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No partner {partner_code} configured"))?;

    let client = UpstreamClient::new(
        partner.token_url.clone(),
        partner.oauth_client_id.clone(),
        partner.oauth_client_secret.clone(),
        Duration::from_secs(config.upstream_timeout_seconds),
        RetryPolicy {
            max_attempts: config.retry_max_attempts,
            initial_backoff: Duration::from_millis(config.retry_backoff_initial_ms),
        },
    )?;

    let outcome = pipeline::refresh(
        db,
        bus,
        cache,
        &client,
        &partner,
        config,
        CancellationToken::new(),
    )
    .await?;

    if outcome.success {
        Ok(())
    } else {
        anyhow::bail!(
            "refresh finished with failures: {}",
            outcome.loader_failures.join("; ")
        )
    }
}

/// Bump the global ingest timestamp whenever a record changes outside a
/// bulk ingest (the pipeline driver stamps bulk ingests itself)
fn spawn_cache_invalidator(bus: &EventBus, cache: &ResponseCache) {
    let mut rx = bus.subscribe();
    let cache = cache.clone();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(_) => {
                    cache.bump_api_timestamp().await;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Periodic editorial sweeps: publish Reviewed runs whose go-live date
/// passed, and keep courses visible by republishing announced runs after
/// the last active one ends
fn spawn_publisher(db: &sqlx::SqlitePool, bus: &EventBus) {
    let db = db.clone();
    let bus = bus.clone();
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(PUBLISHER_INTERVAL_SECONDS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now();
            editorial::publish_due_runs(&db, &bus, now).await;
            let republished = editorial::republish_ended_runs(&db, &bus, now).await;
            if republished > 0 {
                info!(republished, "Republish sweep promoted runs");
            }
        }
    });
}
