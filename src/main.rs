use payments_core::bootstrap::{
    build_outbox_relay, build_provider_registry, build_state, build_webhook_worker, init_tracing, shutdown_signal,
    Backends,
};
use payments_core::config::AppConfig;
use payments_core::http::router::build_router;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = AppConfig::from_env();
    let backends = Backends::from_config(&cfg).await?;
    let providers = build_provider_registry(&cfg);
    tracing::info!(providers = ?providers.names(), default = %cfg.default_provider, "provider registry ready");

    let shutdown = CancellationToken::new();
    let mut workers = Vec::new();
    if cfg.run_workers {
        let relay = build_outbox_relay(&cfg, &backends);
        workers.push(tokio::spawn(relay.run(shutdown.child_token())));
        let webhook_worker = build_webhook_worker(&cfg, &backends);
        workers.push(tokio::spawn(webhook_worker.run(shutdown.child_token())));
    }

    let app = build_router(build_state(&cfg, &backends, providers));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutdown requested");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!("worker task failed: {}", e);
        }
    }
    Ok(())
}
