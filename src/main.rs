use std::net::TcpListener;
use std::sync::Arc;

use medialog::clock::{Clock, SystemClock};
use medialog::configuration::get_configuration;
use medialog::database::{MemoryStore, PgStore};
use medialog::startup::{run, run_refresh_token_cleanup, AppServices};
use medialog::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

fn io_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        io_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let built = if configuration.application.in_memory_store {
        tracing::warn!("Using in-memory store, all data is lost on exit");
        AppServices::build(&configuration, Arc::new(MemoryStore::new()), clock)
    } else {
        tracing::info!("Attempting to connect to database");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&configuration.database.connection_string())
            .await
            .map_err(|e| {
                tracing::error!("Failed to create connection pool: {}", e);
                io_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
            })?;

        let store = PgStore::new(pool);
        store.migrate().await.map_err(|e| {
            tracing::error!("Failed to apply migrations: {}", e);
            io_error(std::io::ErrorKind::Other, "Database migration error")
        })?;
        tracing::info!("Database ready");

        AppServices::build(&configuration, Arc::new(store), clock)
    };
    let services = built.map_err(|e| {
        tracing::error!("Failed to build services: {}", e);
        io_error(std::io::ErrorKind::InvalidInput, "Service configuration error")
    })?;

    tokio::spawn(run_refresh_token_cleanup(
        services.sessions.refresh_tokens().clone(),
        configuration.session.cleanup_interval_seconds,
        configuration.session.cleanup_retention_seconds,
    ));

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, services)?.await
}
