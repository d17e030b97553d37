//! Image validation worker
//!
//! Run with: DATABASE_URL=postgres://... AMQP_URL=amqp://... pixguard-worker

use std::sync::Arc;

use anyhow::{Context, Result};
use pixguard_core::WorkerConfig;
use pixguard_db::{setup_database, DualWriteResultStore, ResultStore, ValidationResultRepository};
use pixguard_processing::ValidationEngine;
use pixguard_storage::{create_document_store, create_fetcher, ContentFetcher};
use pixguard_worker::broker::amqp::AmqpBroker;
use pixguard_worker::{
    reconnect_backoff, telemetry, BrokerError, ConsumerPipeline, DeliveryPolicy, ResultPublisher,
    Supervisor,
};
use tokio_util::sync::CancellationToken;

/// Long-lived collaborators shared by every broker session.
struct Components {
    fetcher: Arc<dyn ContentFetcher>,
    engine: Arc<ValidationEngine>,
    store: Arc<dyn ResultStore>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = WorkerConfig::from_env().context("Failed to load configuration")?;
    telemetry::init_tracing(config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    tracing::info!(
        environment = %config.environment,
        source_service = %config.source_service,
        storage_backend = %config.storage.backend,
        detectors = ?config.validation.detectors,
        prefetch_count = config.broker.prefetch_count,
        "Starting image validation worker"
    );

    let pool = setup_database(&config.database).await?;
    let records = Arc::new(ValidationResultRepository::new(pool.clone()));
    let documents = create_document_store(&config.storage, &config.documents)
        .context("Failed to configure document store")?;
    let components = Components {
        fetcher: create_fetcher(&config.storage)
            .await
            .context("Failed to configure content store")?,
        engine: Arc::new(
            ValidationEngine::from_config(&config.validation)
                .context("Invalid detector configuration")?,
        ),
        store: Arc::new(DualWriteResultStore::new(records, documents)),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let mut attempt: u32 = 0;
    while !shutdown.is_cancelled() {
        match AmqpBroker::connect(&config.broker.url).await {
            Ok(broker) => {
                attempt = 0;
                let result = run_session(&broker, &config, &components, shutdown.clone()).await;
                if let Err(e) = broker.close().await {
                    tracing::warn!(error = %e, "Failed to close broker connection cleanly");
                }
                match result {
                    Ok(()) if shutdown.is_cancelled() => break,
                    Ok(()) => tracing::warn!("Consumer stopped, reconnecting"),
                    Err(e) => tracing::error!(error = %e, "Broker session failed, reconnecting"),
                }
            }
            Err(e) => tracing::error!(error = %e, attempt, "Failed to connect to broker"),
        }

        let delay = reconnect_backoff(attempt);
        attempt = attempt.saturating_add(1);
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    pool.close().await;
    tracing::info!("Worker stopped");
    Ok(())
}

async fn run_session(
    broker: &AmqpBroker,
    config: &WorkerConfig,
    components: &Components,
    shutdown: CancellationToken,
) -> Result<(), BrokerError> {
    broker.declare_topology(&config.broker).await?;

    let publisher = ResultPublisher::new(
        Arc::new(broker.publisher()),
        config.broker.publish_exchange.clone(),
        config.broker.publish_routing_key.clone(),
        config.source_service.clone(),
    );
    let pipeline = Arc::new(ConsumerPipeline::new(
        Arc::clone(&components.fetcher),
        Arc::clone(&components.engine),
        Arc::clone(&components.store),
        publisher,
        DeliveryPolicy::from_config(&config.broker),
    ));
    let supervisor = Supervisor::new(
        pipeline,
        usize::from(config.broker.prefetch_count),
        config.broker.shutdown_grace(),
    );

    let mut deliveries = broker.consume(&config.broker).await?;
    supervisor.run(&mut deliveries, shutdown).await
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
    shutdown.cancel();
}
