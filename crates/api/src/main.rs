//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use domain::{ExpirySweeper, SystemClock};
use sqlx::postgres::PgPoolOptions;
use store::{
    AvailabilityCounter, BookingStore, InMemoryAvailabilityCounter, InMemoryBookingStore,
    PostgresBookingStore, RedisAvailabilityCounter,
};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn open_store(config: &Config) -> Result<Arc<dyn BookingStore>, BoxError> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;
            let store = PostgresBookingStore::with_lock_timeout(pool, config.lock_timeout);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL booking store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory booking store");
            Ok(Arc::new(InMemoryBookingStore::with_lock_timeout(
                config.lock_timeout,
            )))
        }
    }
}

async fn open_counter(config: &Config) -> Result<Arc<dyn AvailabilityCounter>, BoxError> {
    match &config.redis_url {
        Some(url) => {
            let counter = RedisAvailabilityCounter::connect(url).await?;
            tracing::info!("using Redis availability counter");
            Ok(Arc::new(counter))
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory availability counter");
            Ok(Arc::new(InMemoryAvailabilityCounter::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Open backends and build application state
    let store = open_store(&config).await?;
    let counter = open_counter(&config).await?;
    let state = Arc::new(api::AppState::new(
        store,
        counter,
        Arc::new(SystemClock),
        config.policy(),
    ));

    // 4. Warm the availability counter; a failure here only delays it
    if let Err(e) = state.availability.initialize_if_absent().await {
        tracing::warn!(error = %e, "availability counter not initialized at startup");
    }

    // 5. Start the expiry sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::spawn(state.bookings.clone(), config.sweep_interval, shutdown_rx);

    // 6. Build the application and start the server
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 7. Stop the sweeper and wait for its current run to finish
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "expiry sweeper task failed");
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
