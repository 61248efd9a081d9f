use doppler_core::config::{load_dotenv, DopplerConfig};
use doppler_http::{BoxError, Server};
use doppler_jobs::{open_queue, DeliveryWorker, QueueOptions, WorkerOptions};
use doppler_service::{router, SchedulingService};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    load_dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,doppler=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DopplerConfig::from_env()?;
    info!(config = ?config, "Starting doppler");

    let queue = open_queue(
        &config.queue_url,
        &config.queue_key,
        QueueOptions::from(&config),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = DeliveryWorker::new(queue.clone(), WorkerOptions::from(&config))?;
    let mut workers = Vec::with_capacity(config.workers);
    for id in 0..config.workers {
        let worker = worker.clone();
        let mut shutdown = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            info!(worker = id, "Delivery worker started");
            worker
                .run(async move {
                    let _ = shutdown.wait_for(|stop| *stop).await;
                })
                .await;
        }));
    }

    let service = Arc::new(SchedulingService::new(queue));
    let served = Server::new(router(service))
        .run_with_shutdown(&config.bind, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    let _ = shutdown_tx.send(true);
    for handle in workers {
        if let Err(e) = handle.await {
            error!("Delivery worker panicked: {}", e);
        }
    }

    info!("doppler stopped");
    served
}
