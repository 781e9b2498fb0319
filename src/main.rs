use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_vault::{
    api,
    config::{Config, StorageBackend},
    janitor::Janitor,
    object_store as obj,
    service::FileService,
    storage::Database,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "file-vault starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db = Database::open(&config.server.data_dir)?;
    info!("Database opened at: {}", config.server.data_dir);

    // Initialize object store backend
    let object_store: Arc<dyn obj::ObjectStore> = match config.storage.backend {
        StorageBackend::Local => {
            let store = obj::LocalStore::new(&config.storage.local_storage_path)?;
            info!(
                "Using local storage backend at: {}",
                config.storage.local_storage_path
            );
            Arc::new(store)
        }
        StorageBackend::S3 => {
            let endpoint = config
                .storage
                .s3_endpoint
                .as_deref()
                .expect("S3_ENDPOINT validated in config");
            let bucket = config
                .storage
                .s3_bucket
                .as_deref()
                .expect("S3_BUCKET validated in config");
            let access_key = config
                .storage
                .s3_access_key
                .as_deref()
                .expect("S3_ACCESS_KEY validated in config");
            let secret_key = config
                .storage
                .s3_secret_key
                .as_deref()
                .expect("S3_SECRET_KEY validated in config");
            let store = obj::S3Store::new(
                endpoint,
                bucket,
                &config.storage.s3_region,
                access_key,
                secret_key,
            )?;
            info!("Using S3 storage backend, bucket: {bucket} at {endpoint}");
            Arc::new(store)
        }
    };

    let files = FileService::new(db.clone(), Arc::clone(&object_store), config.max_tags);

    // Start the janitor sweep loop
    let janitor = Janitor::new(db.clone(), Arc::clone(&object_store), config.janitor.clone());
    let janitor_handle = janitor.spawn();
    info!(
        interval_secs = config.janitor.sweep_interval_secs,
        retention_hours = config.janitor.retention_hours,
        "Janitor started"
    );

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        object_store,
        files,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup: stop the sweeper
    info!("Shutting down background tasks");
    janitor_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
