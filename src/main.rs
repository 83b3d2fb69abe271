#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]
//! Backend entry-point: wires the connection pool, migrations, the
//! ingestion scheduler, and the HTTP server.

mod server;

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use backend::domain::ports::{DefaultClock, SourcePlugin};
use backend::domain::resolver::LocationResolver;
use backend::domain::{Error, IngestionEngine};
use backend::inbound::http::health::HealthState;
use backend::outbound::persistence::{DbPool, DieselEntityStore, PoolConfig};
use chrono::{DateTime, Utc};
use clap::Parser;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use server::ServerConfig;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Interval between ingestion scheduler ticks. Plugins are scheduled
/// uniformly rather than individually cron-driven, since the current
/// registry carries no plugins with differing cadences (§10.1).
const SCHEDULER_TICK: Duration = Duration::from_secs(300);

/// Environment-sourced process configuration (§10.2).
#[derive(Debug, Clone, Parser)]
#[command(name = "drifthold", about = "Personal spatiotemporal database service")]
struct Config {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Shared secret required on the `X-API-Key` header.
    #[arg(long, env = "API_KEY")]
    api_key: String,

    /// Address the HTTP server binds to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port the HTTP server binds to.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Directory external source plugins would be loaded from.
    ///
    /// Informational only: the plugin registry is compiled in (§10.1),
    /// so this never triggers a runtime filesystem scan.
    #[arg(long, env = "PLUGIN_DIR")]
    plugin_dir: Option<String>,

    /// Watermark timestamp assumed for a source with no prior run.
    #[arg(long, env = "WATERMARK_EPOCH", value_parser = parse_epoch, default_value = "1970-01-01T00:00:00Z")]
    watermark_epoch: DateTime<Utc>,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

fn parse_epoch(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| format!("invalid timestamp {raw:?}: {err}"))
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::from_default_env();
    let result = match format {
        LogFormat::Json => fmt().with_env_filter(filter).json().try_init(),
        LogFormat::Pretty => fmt().with_env_filter(filter).try_init(),
    };
    if let Err(err) = result {
        warn!(error = %err, "tracing init failed");
    }
}

/// Build the process-wide source plugin registry (§4.4.1).
///
/// Returns a fatal error if two plugins share a `name`, per §7's Conflict
/// startup failure. The registry is empty today: no concrete source
/// plugin ships with this build, but ingestion wiring is exercised end
/// to end in tests via `MockSourcePlugin`.
fn build_plugin_registry() -> Result<Vec<Arc<dyn SourcePlugin>>, Error> {
    let plugins: Vec<Arc<dyn SourcePlugin>> = Vec::new();
    let mut seen = HashSet::new();
    for plugin in &plugins {
        if !seen.insert(plugin.name().to_owned()) {
            return Err(Error::conflict(format!(
                "duplicate source plugin name: {}",
                plugin.name()
            )));
        }
    }
    Ok(plugins)
}

/// Run every registered plugin on a fixed interval until the process exits.
///
/// Builds its own [`DieselEntityStore`] from `pool` both as the engine's
/// `EntityStore` and as the resolver's native-fix lookup, since the two
/// ports are implemented by the same adapter but the resolver is generic
/// over its lookup type rather than dynamically dispatched.
fn spawn_ingestion_scheduler(
    pool: DbPool,
    plugins: Vec<Arc<dyn SourcePlugin>>,
    watermark_epoch: DateTime<Utc>,
) {
    if plugins.is_empty() {
        info!("no source plugins registered; ingestion scheduler idle");
        return;
    }

    tokio::spawn(async move {
        let store: Arc<dyn backend::domain::ports::EntityStore> =
            Arc::new(DieselEntityStore::new(pool.clone()));
        let resolver = LocationResolver::with_default_backbone(DieselEntityStore::new(pool));
        let engine = IngestionEngine::new(store, resolver, Arc::new(DefaultClock), watermark_epoch);
        let mut ticker = interval(SCHEDULER_TICK);
        loop {
            ticker.tick().await;
            backend::domain::run_all(&engine, &plugins).await;
        }
    });
}

/// Run embedded migrations against `database_url` using a blocking
/// connection, since `diesel_migrations` has no async-native runner.
fn run_migrations(database_url: &str) -> io::Result<()> {
    use diesel::Connection;
    let mut conn = diesel::PgConnection::establish(database_url)
        .map_err(|err| io::Error::other(format!("connect for migrations: {err}")))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| io::Error::other(format!("run migrations: {err}")))?;
    Ok(())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    run_migrations(&config.database_url)?;

    let pool = DbPool::new(PoolConfig::new(&config.database_url))
        .await
        .map_err(|err| io::Error::other(format!("create database pool: {err}")))?;

    let plugins = build_plugin_registry().map_err(io::Error::other)?;
    spawn_ingestion_scheduler(pool.clone(), plugins, config.watermark_epoch);

    let bind_addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|err| io::Error::other(format!("invalid bind address: {err}")))?;

    let health_state = actix_web::web::Data::new(HealthState::new());
    let server_config = ServerConfig::new(config.api_key, bind_addr, pool);
    let server = server::create_server(health_state, server_config)?;
    server.await
}
