use std::{
    future::Future,
    sync::{Arc, OnceLock},
    time::Duration,
};

use anyhow::Context;
use axum::{
    Extension, Router,
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::get,
    serve,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shared::config::server::{Config, DatabaseConfig, LogFormat};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    app_state::AppState,
    db::bootstrap,
    middleware::request_context::{self, RequestIdState},
    routes::{self, openapi::openapi_routes},
    store::PgMessageStore,
    tracer,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Process-wide Prometheus handle; installs the recorder on first use.
pub fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(err) = metrics::set_global_recorder(recorder) {
                warn!(error = %err, "metrics recorder already installed");
            }
            handle
        })
        .clone()
}

async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        handle.render(),
    )
}

/// Initializes the global tracing subscriber and returns the configured level.
pub fn initialize_tracing(config: &Config) -> String {
    let builder = fmt::fmt()
        .with_env_filter(build_env_filter(config))
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let installed = if matches!(config.logging.format, LogFormat::Json) {
        builder.json().with_ansi(false).try_init()
    } else {
        builder.with_ansi(true).try_init()
    };
    if installed.is_err() {
        warn!("tracing subscriber already installed");
    }

    config.logging.level.clone()
}

pub(crate) fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

/// # Errors
/// Returns an error if the pool cannot connect.
pub async fn create_database_pool(url: &str, db: &DatabaseConfig) -> Result<sqlx::PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .connect(url)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(f64::from(db.max_connections));
    Ok(pool)
}

/// Builds application state, using Postgres when a database URL is configured.
///
/// # Errors
/// Returns an error if the database is unreachable or the schema step fails.
pub async fn create_app_state(config: Arc<Config>) -> anyhow::Result<Arc<AppState>> {
    let Some(url) = config.database.url.as_deref() else {
        info!("no database configured; keeping messages in memory");
        return Ok(Arc::new(AppState::in_memory(config)));
    };

    let pool = create_database_pool(url, &config.database)
        .await
        .context("failed to connect to the database")?;
    bootstrap::ensure_liveness(&pool)
        .await
        .context("database liveness check failed")?;
    bootstrap::run(&pool)
        .await
        .context("database bootstrap failed")?;

    info!("using postgres message store");
    Ok(Arc::new(AppState::new(
        Arc::new(PgMessageStore::new(pool)),
        config,
    )))
}

pub fn create_cors_layer(config: &Config) -> CorsLayer {
    use http::Method;

    let methods = vec![
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let cors_config = &config.server.cors;
    let cors = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::any())
        .allow_credentials(cors_config.allow_credentials)
        .max_age(Duration::from_secs(cors_config.max_age_seconds));

    if cors_config.allowed_origins.is_empty()
        || cors_config.allowed_origins.iter().any(|origin| origin == "*")
    {
        cors.allow_origin(AllowOrigin::any())
    } else {
        let origins = cors_config
            .allowed_origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// Assembles routes and middleware around `state`.
pub fn create_app_router(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let config = Arc::clone(&state.config);
    let request_id_state = RequestIdState::from_config(&config);

    Router::new()
        .nest("/api", routes::api::create_api_router(Arc::clone(&state)))
        .merge(routes::health::create_health_router())
        .merge(openapi_routes())
        .route("/metrics", get(metrics_endpoint))
        .layer(Extension(metrics_handle))
        .layer(create_cors_layer(&config))
        .layer(tracer::create_trace_layer())
        .layer(axum::middleware::from_fn_with_state(
            request_id_state,
            request_context::assign_request_id,
        ))
        .with_state(state)
}

pub async fn create_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

/// Serves `app` on an already bound listener until `shutdown` resolves.
///
/// # Errors
/// Returns an error if the server loop fails.
pub async fn serve_on<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server loop failed")
}

/// Starts the server using the fully resolved configuration.
///
/// # Errors
/// Returns an error if startup fails or the listener cannot be bound.
pub async fn run(config: Config) -> anyhow::Result<()> {
    initialize_tracing(&config);
    info!("Starting server...");

    let metrics_handle = metrics_handle();
    let config = Arc::new(config);
    let state = create_app_state(Arc::clone(&config)).await?;
    let app = create_app_router(state, metrics_handle);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");

    serve_on(listener, app, create_shutdown_signal()).await
}
