mod config;
mod protocol;
mod sequence_client;
mod session;
mod smooth_client;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::config::CaptureConfig;
use crate::sequence_client::SequenceClient;
use crate::session::Clients;
use crate::smooth_client::SmoothClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg_path = std::env::var("CAPTURE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/capture.json"));
    let mut cfg = CaptureConfig::load(&cfg_path)?;
    if let Ok(addr) = std::env::var("BIND_ADDR") {
        cfg.bind_addr = addr;
    }

    let clients = Clients {
        sequence: SequenceClient::new(&cfg.sequence_base_url, cfg.timeout())
            .context("failed to build sequence client")?,
        smooth: SmoothClient::new(&cfg.gateway_base_url, cfg.timeout())
            .context("failed to build gateway client")?,
    };
    tracing::info!(
        mode = ?cfg.mode,
        "sequence service: {}, gateway: {}",
        cfg.sequence_base_url,
        cfg.gateway_base_url
    );

    let listener = TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind TCP listener at {}", cfg.bind_addr))?;
    tracing::info!("capture backend listening on ws://{}", cfg.bind_addr);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let clients = clients.clone();
                let mode = cfg.mode;
                tokio::spawn(async move {
                    if let Err(e) = session::handle_connection(stream, clients, mode).await {
                        tracing::warn!("connection ended with error: {:#}", e);
                    }
                });
            }
            Err(e) => {
                tracing::error!("accept error: {}", e);
                // small delay to avoid tight loop in case of persistent errors
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        }
    }
}
