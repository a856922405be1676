pub mod aggregate;
pub mod api;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod sandbox;
pub mod store;
pub mod worker;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;

use crate::engine::{
    api::{AdmissionLimits, routes},
    config::EngineConfig,
    dispatcher::{DispatchSettings, Dispatcher},
    metrics::MetricsRegistry,
    queue::Scheduler,
    sandbox::{LanguageRegistry, SandboxFactory, SandboxRunner},
    worker::spawn_worker_pool,
};

pub async fn run() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();
    init_tracing(&config);

    let metrics = Arc::new(MetricsRegistry::new());
    let store = store::from_config(&config.test_case_store)
        .await
        .context("test case store init failed")?;
    let scheduler = Scheduler::new(config.queue_capacity, metrics.clone());
    let backend = SandboxFactory::from_config(&config);
    let runner = Arc::new(SandboxRunner::new(backend, config.runner_settings()));

    spawn_worker_pool(
        config.sandbox_workers,
        scheduler.receiver(),
        runner.clone(),
        metrics.clone(),
    );

    let registry = LanguageRegistry::default();
    tracing::info!(
        languages = ?registry.languages().collect::<Vec<_>>(),
        "language registry loaded"
    );
    let dispatcher = Dispatcher::new(
        registry,
        scheduler,
        store,
        metrics.clone(),
        DispatchSettings {
            default_limits: config.default_limits,
            limit_ceiling: config.limit_ceiling,
            aggregation_policy: config.aggregation_policy,
        },
    );
    let app: Router = routes(
        dispatcher,
        metrics,
        AdmissionLimits {
            max_code_bytes: config.max_code_bytes,
            max_test_cases: config.max_test_cases,
        },
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    let local = listener
        .local_addr()
        .unwrap_or(SocketAddr::from(([0, 0, 0, 0], 0)));
    tracing::info!(
        bind = %local,
        backend = runner.backend_name(),
        workers = config.sandbox_workers,
        "code judge ready"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(config: &EngineConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .init();
}
