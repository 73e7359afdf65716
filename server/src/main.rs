//! Turnstile HTTP server.
//!
//! Registration, waitlist and ticket scanning backed by `PostgreSQL`.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnstile_core::notification::Notifier;
use turnstile_core::store::RegistrationStore;
use turnstile_postgres::{
    PoolConfig, PostgresNotificationLog, PostgresRegistrationStore, PostgresSessionDirectory,
};
use turnstile_runtime::TracingNotifier;
use turnstile_runtime::metrics::MetricsServer;
use turnstile_server::{
    AppState, Collaborators, Config, NotificationSink, build_router, metrics_router,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.server.log_level)
                .unwrap_or_else(|_| "turnstile=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Turnstile HTTP server");
    config.validate()?;

    info!(
        max_connections = config.postgres.max_connections,
        qr_ttl_hours = config.tickets.qr_ttl_hours,
        notification_sink = ?config.notifications.sink,
        "Configuration loaded"
    );

    let pool_config = PoolConfig {
        max_connections: config.postgres.max_connections,
        min_connections: config.postgres.min_connections,
        connect_timeout: std::time::Duration::from_secs(config.postgres.connect_timeout),
        idle_timeout: std::time::Duration::from_secs(config.postgres.idle_timeout),
    };
    let store = PostgresRegistrationStore::connect(&config.postgres.url, &pool_config).await?;
    info!("Registration store connected");
    if config.postgres.run_migrations {
        store.migrate().await?;
        info!("Migrations applied");
    }

    let pool = store.pool().clone();
    let store: Arc<dyn RegistrationStore> = Arc::new(store);
    let sessions = Arc::new(PostgresSessionDirectory::new(pool.clone()));
    let notifier: Arc<dyn Notifier> = match config.notifications.sink {
        NotificationSink::Log => Arc::new(TracingNotifier),
        NotificationSink::Postgres => Arc::new(PostgresNotificationLog::new(pool)),
    };

    let mut metrics = MetricsServer::new(config.metrics_addr()?);
    metrics.start()?;
    let metrics_listener = TcpListener::bind(metrics.addr()).await?;
    let metrics_app = metrics_router(Arc::new(metrics));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_app).await {
            error!(error = %e, "Metrics server stopped");
        }
    });

    let state = AppState::new(Collaborators::new(store, sessions, notifier), &config);
    let followups = state.followups().clone();
    let app = build_router(state);

    let addr = config.server_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(pending = followups.pending(), "Draining background work");
    if let Err(pending) = followups.shutdown(config.shutdown_timeout()).await {
        warn!(pending, "Shutdown timeout reached with background work still pending");
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
