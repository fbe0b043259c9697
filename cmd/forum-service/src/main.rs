//! # forum-service
//!
//! The entry point that assembles the service from configuration: the
//! SQLite content store, the configured media backend, the graph schema,
//! and the axum router.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api_adapters::graph::document::OperationKind;
use api_adapters::{router, AppState, Executor, Metrics, Schema};
use configs::{LocalMediaSettings, LogSettings, MediaBackend, MediaSettings, S3MediaSettings, Settings};
use domains::{MediaStorage, SignedObjectReader};
use services::{ContentService, MediaService, SubmitterHasher};
use storage_adapters::SqliteContentRepository;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(not(feature = "db-sqlite"))]
compile_error!("forum-service needs the `db-sqlite` feature");

type MediaBackends = (Arc<dyn MediaStorage>, Option<Arc<dyn SignedObjectReader>>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Settings { server, database, media, identity, log } =
        Settings::load().context("failed to load configuration")?;
    init_tracing(&log);

    // 1. Content store
    let repo = SqliteContentRepository::connect(&database.url, database.max_connections)
        .await
        .context("failed to open database")?;
    repo.migrate().await.context("failed to apply migrations")?;
    let pool = repo.pool().clone();
    info!(url = %database.url, "database ready");

    // 2. Media store
    let max_upload_bytes = media.max_upload_bytes;
    let (store, media_reader) = media_backend(media).await?;

    // 3. Services and the operation graph
    let content = Arc::new(ContentService::new(Arc::new(repo), SubmitterHasher::new(identity.salt)));
    let schema = Arc::new(Schema::forum());
    info!(
        queries = ?schema.operation_names(OperationKind::Query),
        mutations = ?schema.operation_names(OperationKind::Mutation),
        "schema built"
    );

    let state = AppState {
        executor: Arc::new(Executor::new(schema, content)),
        media: Arc::new(MediaService::new(store, max_upload_bytes)),
        media_reader,
        metrics: Arc::new(Metrics::new()),
        request_timeout: Duration::from_secs(server.request_timeout_secs),
        max_upload_bytes,
    };

    // 4. Serve
    let bind_addr = server.bind_address();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("forum-service listening on http://{bind_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    pool.close().await;
    info!("forum-service stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", log.level)));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn media_backend(media: MediaSettings) -> anyhow::Result<MediaBackends> {
    match media.backend {
        MediaBackend::Local => local_store(media.local),
        MediaBackend::S3 => s3_store(media.s3).await,
    }
}

#[cfg(feature = "media-local")]
fn local_store(cfg: LocalMediaSettings) -> anyhow::Result<MediaBackends> {
    use secrecy::SecretString;
    use storage_adapters::LocalMediaStore;

    let signing_key = if cfg.has_signing_key() {
        cfg.signing_key
    } else {
        warn!("media.local.signing_key is empty; links will not survive a restart");
        SecretString::from(format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        ))
    };

    let local = Arc::new(LocalMediaStore::new(cfg.root.clone(), &cfg.public_base_url, signing_key));
    info!(root = %cfg.root.display(), "local media store");
    let store: Arc<dyn MediaStorage> = local.clone();
    let reader: Arc<dyn SignedObjectReader> = local;
    Ok((store, Some(reader)))
}

#[cfg(not(feature = "media-local"))]
fn local_store(_: LocalMediaSettings) -> anyhow::Result<MediaBackends> {
    anyhow::bail!("media.backend = \"local\" needs the `media-local` feature")
}

#[cfg(feature = "media-s3")]
async fn s3_store(cfg: S3MediaSettings) -> anyhow::Result<MediaBackends> {
    use storage_adapters::{S3MediaStore, S3Options};

    let store = S3MediaStore::connect(S3Options {
        endpoint: cfg.endpoint,
        region: cfg.region,
        bucket: cfg.bucket,
        access_key: cfg.access_key,
        secret_key: cfg.secret_key,
    })
    .await;
    let store: Arc<dyn MediaStorage> = Arc::new(store);
    Ok((store, None))
}

#[cfg(not(feature = "media-s3"))]
async fn s3_store(_: S3MediaSettings) -> anyhow::Result<MediaBackends> {
    anyhow::bail!("media.backend = \"s3\" needs the `media-s3` feature")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}
