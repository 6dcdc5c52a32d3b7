use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing::info;

use dns_reconciler::{config::Config, provider::PdnsProvider, telemetry, webhook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let cfg = Config::from_env()?;
    cfg.validate()?;
    let port = cfg.port;

    info!("PowerDNS API : {}", cfg.pdns_api_url);
    info!("Server ID    : {}", cfg.pdns_server_id);
    info!(
        "Domain filter: {}",
        if cfg.domain_filter.is_empty() { "(all zones)" } else { &cfg.domain_filter }
    );
    info!("Default TTL  : {}s", cfg.default_ttl);
    if cfg.dry_run {
        info!("Dry run      : no changes will be written");
    }

    let pdns = PdnsProvider::new(cfg.pdns()?).context("creating PowerDNS provider")?;
    let app = webhook::router(Arc::new(pdns));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
