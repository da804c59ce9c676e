use payments_core::bootstrap::{build_webhook_worker, init_tracing, shutdown_signal, Backends};
use payments_core::config::AppConfig;
use payments_core::queue::names;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = AppConfig::from_env();
    let backends = Backends::from_config(&cfg).await?;

    let dead = backends.queue.list_dead(names::WEBHOOK_RETRY, 100).await?;
    if !dead.is_empty() {
        tracing::warn!(count = dead.len(), "dead webhook jobs awaiting manual intervention");
    }

    let worker = build_webhook_worker(&cfg, &backends);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    shutdown_signal().await;
    tracing::info!("stopping webhook worker");
    shutdown.cancel();
    handle.await?;
    Ok(())
}
