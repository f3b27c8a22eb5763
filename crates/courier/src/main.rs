use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use courier_bridge::{BridgeConfig, BridgeTransport};
use courier_core::{config::Config, Courier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    courier_core::logging::init("courier")?;

    let cfg = Arc::new(Config::load()?);
    let transport = Arc::new(BridgeTransport::new(BridgeConfig::from(cfg.as_ref()))?);
    let courier = Arc::new(Courier::new(cfg.clone(), transport));

    let listener = TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("bind {}", cfg.bind_addr))?;
    info!(
        bridge = %cfg.bridge_url,
        sessions_dir = %cfg.sessions_dir.display(),
        "courier starting"
    );

    courier_http::serve(listener, courier.clone(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler failed; running until killed");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
    })
    .await?;

    let closed = courier.shutdown().await;
    info!(closed, "all sessions closed");
    Ok(())
}
