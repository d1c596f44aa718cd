use std::sync::Arc;

use anyhow::Context;
use sign_gateway::{
    config::{GatewayConfig, SESSION_TTL, SWEEP_PERIOD},
    router, AppState, HttpClassifier, StabilizationService,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = GatewayConfig::from_env()?;
    let classifier = HttpClassifier::new(&cfg.infer_base_url, cfg.infer_timeout)
        .context("failed to build inference client")?;
    tracing::info!(
        "inference service url: {} (timeout {:?})",
        classifier.base_url(),
        cfg.infer_timeout
    );

    let service = Arc::new(StabilizationService::new(Arc::new(classifier)));
    let sweeper = service.spawn_sweeper(SWEEP_PERIOD);
    tracing::info!("session ttl {:?}, sweep every {:?}", SESSION_TTL, SWEEP_PERIOD);

    let app = router(AppState { service });

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
