use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use dns_reconciler::{
    config::{Config, RegistryKind},
    controller::Controller,
    provider::PdnsProvider,
    registry::{NoopRegistry, Registry, TxtRegistry},
    source::FileSource,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let cfg = Config::from_env()?;
    cfg.validate()?;

    info!("PowerDNS API : {}", cfg.pdns_api_url);
    info!("Source file  : {}", cfg.source_file);
    info!("Registry     : {} (owner '{}')", cfg.registry, cfg.owner_id);
    info!("Policy       : {}", cfg.policy);
    info!("Interval     : {}s", cfg.interval_secs);
    if cfg.dry_run {
        info!("Dry run      : no changes will be written");
    }

    let provider = Arc::new(PdnsProvider::new(cfg.pdns()?).context("creating PowerDNS provider")?);
    let registry: Box<dyn Registry> = match cfg.registry_kind()? {
        RegistryKind::Txt => Box::new(TxtRegistry::new(provider, &cfg.owner_id, cfg.txt_name_mapper()?)?),
        RegistryKind::Noop => Box::new(NoopRegistry::new(provider)),
    };

    let controller = Controller::new(FileSource::new(&cfg.source_file), registry)
        .domain_filter(cfg.domain_filters())
        .managed_types(cfg.managed_types()?)
        .policy(cfg.policy()?)
        .adopt_unowned(cfg.adopt_unowned)
        .interval(cfg.interval());

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // keep the sender alive: dropping it would stop the loop
            warn!("listening for ctrl-c failed: {e}");
            std::future::pending::<()>().await;
        }
        info!("received ctrl-c");
        let _ = tx.send(true);
    });

    controller.run(rx).await?;
    Ok(())
}
