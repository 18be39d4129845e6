//! Worker binary: wires the store, model-service clients, and queue, then
//! runs the executor until SIGINT.

use std::sync::Arc;

use anyhow::Context;
use revid_ml_client::{HttpDetector, HttpEmbedder, MlClientConfig, ObjectDetector, ReidEmbedder};
use revid_queue::{JobQueue, QueueConfig};
use revid_store::Store;
use revid_worker::{JobExecutor, WorkerConfig, WorkerContext};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    revid_worker::logging::init_tracing();

    let config = WorkerConfig::from_env();
    info!(?config, "Starting revid-worker");

    let ml_config = MlClientConfig::from_env();
    let detector: Arc<dyn ObjectDetector> =
        Arc::new(HttpDetector::new(ml_config.clone()).context("building detection client")?);
    let embedder: Arc<dyn ReidEmbedder> =
        Arc::new(HttpEmbedder::new(ml_config).context("building embedding client")?);

    let store = Store::new();
    let ctx = WorkerContext::for_worker(config, store, detector, Some(embedder), None);

    let (queue, receiver) = JobQueue::new(QueueConfig::from_env());
    let executor = JobExecutor::new(ctx, queue, receiver);
    let shutdown = executor.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, shutting down");
            let _ = shutdown.send(true);
        }
    });

    executor.run().await?;
    Ok(())
}
