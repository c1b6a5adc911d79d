use std::{path::Path, process, sync::Arc};

use longbox::{
    application::{
        error::AppError,
        jobs::{ImageJobConfig, ImageJobSupervisor, JobTracker},
    },
    cache::{self, CacheConfig, CacheState, Invalidator},
    config,
    infra::{
        db::SqliteRepositories,
        error::InfraError,
        http::{self, AppState},
        storage::ImageStorage,
        telemetry,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate => run_migrate(settings).await,
    }
}

async fn open_database(settings: &config::DatabaseSettings) -> Result<SqliteRepositories, AppError> {
    ensure_database_directory(&settings.url)?;
    let pool = SqliteRepositories::connect(&settings.url, settings.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    SqliteRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    Ok(SqliteRepositories::new(pool))
}

/// SQLite creates the database file on demand but not its directory.
fn ensure_database_directory(url: &str) -> Result<(), AppError> {
    let path = url
        .trim_start_matches("sqlite:")
        .trim_start_matches("//")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|err| AppError::from(InfraError::from(err))),
        _ => Ok(()),
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    open_database(&settings.database).await?;
    info!(database = %settings.database.url, "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = Arc::new(open_database(&settings.database).await?);
    let shutdown = CancellationToken::new();

    let cache_config = CacheConfig::from(&settings.cache);
    let (cache_state, invalidator) = if cache_config.enabled {
        let store = cache::open_store(&cache_config)
            .map_err(|err| AppError::from(InfraError::cache(err.to_string())))?;
        let invalidator = Arc::new(Invalidator::new(
            Arc::clone(&store),
            cache_config.retry,
            shutdown.child_token(),
        ));
        info!(
            backend = ?cache_config.backend,
            ttl_seconds = cache_config.ttl_seconds,
            "response cache enabled"
        );
        let state = CacheState::new(cache_config, store, Arc::clone(&invalidator));
        (Some(state), invalidator)
    } else {
        info!("response cache disabled");
        (None, Arc::new(Invalidator::disabled()))
    };

    let storage = Arc::new(
        ImageStorage::new(settings.images.root.clone()).map_err(|err| {
            AppError::from(InfraError::configuration(format!(
                "image root `{}` is not usable: {err}",
                settings.images.root.display()
            )))
        })?,
    );

    let tracker = Arc::new(JobTracker::new());
    let (jobs, supervisor) = ImageJobSupervisor::spawn(
        ImageJobConfig {
            queue_capacity: settings.jobs.queue_capacity.get(),
            max_concurrency: settings.jobs.max_concurrency.get(),
        },
        tracker,
        invalidator,
        storage.clone(),
        shutdown.child_token(),
    );

    let state = AppState {
        repos: repositories,
        storage,
        jobs,
    };
    let upload_limit = usize::try_from(settings.images.max_upload_bytes.get()).unwrap_or(usize::MAX);
    let router = http::build_router(state, cache_state, upload_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown.cancel();
    if tokio::time::timeout(settings.server.graceful_shutdown, supervisor)
        .await
        .is_err()
    {
        warn!("image job supervisor did not stop before the shutdown deadline");
    }

    served.map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
