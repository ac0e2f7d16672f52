use std::future::Future;
use std::sync::Arc;

use axum::Router;
use envconfig::Envconfig;
use eyre::Result;
use tokio::signal::unix::{signal, SignalKind};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use config::{Config, StoreBackend};
use prometheus::setup_metrics_routes;
use registry_common::pgstore::PgRegistryStore;
use registry_common::registry::Registry;
use registry_common::runtime::{HttpMetricsClient, HttpRuntimeClient, MetricsClient};
use registry_common::store::{MemoryRegistryStore, RegistryStore};

mod config;
mod handlers;
mod prometheus;

fn init_tracing(debug: bool) {
    let log_layer = {
        let base_layer = fmt::layer().with_target(true).with_level(true);

        if debug {
            base_layer
                .with_ansi(true)
                .with_filter(EnvFilter::from_default_env())
                .boxed()
        } else {
            base_layer
                .json()
                .with_filter(EnvFilter::from_default_env())
                .boxed()
        }
    };

    tracing_subscriber::registry().with(log_layer).init();
}

fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    let mut term = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = term.recv() => {},
            _ = interrupt.recv() => {},
        };

        info!("shutting down gracefully");
    })
}

async fn build_registry(config: &Config) -> Result<Registry> {
    let store: Arc<dyn RegistryStore + Send + Sync> = match config.store_backend {
        StoreBackend::Postgres => Arc::new(
            PgRegistryStore::new(&config.database_url, config.max_pg_connections).await?,
        ),
        StoreBackend::Memory => {
            info!("using the in-memory store, pipelines will not survive a restart");
            Arc::new(MemoryRegistryStore::new())
        }
    };

    let runtime = HttpRuntimeClient::new(config.runtime_url.clone(), config.call_timeout.0)?;

    let metrics_client: Option<Arc<dyn MetricsClient + Send + Sync>> = match &config.metrics_url {
        Some(url) => Some(Arc::new(HttpMetricsClient::new(
            url.clone(),
            config.call_timeout.0,
        )?)),
        None => None,
    };

    Ok(Registry::new(
        store,
        Arc::new(runtime),
        metrics_client,
        config.registry_config(),
    ))
}

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal()?)
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::init_from_env()?;

    init_tracing(config.debug);

    let registry = build_registry(&config).await?;

    let app = handlers::add_routes(
        Router::new(),
        handlers::AppState::new(registry),
        config.max_body_size,
        config.concurrency_limit,
    );
    let app = match config.export_prometheus {
        true => setup_metrics_routes(app)?,
        false => app,
    };
    let app = app.layer(TraceLayer::new_for_http());

    info!("listening on {}", config.bind());

    if let Err(e) = listen(app, config.bind()).await {
        error!("failed to start pipeline registry http server, {}", e);
        return Err(e);
    }

    Ok(())
}
