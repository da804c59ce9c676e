use payments_core::bootstrap::{build_outbox_relay, init_tracing, shutdown_signal, Backends};
use payments_core::config::AppConfig;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = AppConfig::from_env();
    let backends = Backends::from_config(&cfg).await?;
    let relay = build_outbox_relay(&cfg, &backends);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(relay.run(shutdown.clone()));

    shutdown_signal().await;
    tracing::info!("stopping outbox worker");
    shutdown.cancel();
    handle.await?;
    Ok(())
}
