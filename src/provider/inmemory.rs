use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    domain_filter::{DomainFilter, Zone, ZoneIdName},
    endpoint::{Endpoint, EndpointKey},
    plan::{Changes, Operation},
    provider::{group_by_zone, Provider, ProviderError},
};

/// A provider backed by a map in memory.
///
/// Rejects inconsistent changes (creating an existing record, updating or
/// deleting a missing one) before touching the store, so a failed apply
/// leaves it unchanged.
pub struct InMemoryProvider {
    zones: ZoneIdName,
    domain_filter: DomainFilter,
    dry_run: bool,
    store: Mutex<BTreeMap<EndpointKey, Endpoint>>,
}

impl InMemoryProvider {
    pub fn new(zones: &[Zone]) -> Self {
        Self {
            zones: zones.iter().collect(),
            domain_filter: DomainFilter::default(),
            dry_run: false,
            store: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_domain_filter(mut self, filter: DomainFilter) -> Self {
        self.domain_filter = filter;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Insert records directly, bypassing change validation.
    pub async fn seed(&self, endpoints: Vec<Endpoint>) {
        let mut store = self.store.lock().await;
        for ep in endpoints {
            store.insert(ep.key(), ep);
        }
    }

    pub async fn snapshot(&self) -> Vec<Endpoint> {
        self.store.lock().await.values().cloned().collect()
    }

    /// Replay `changes` in application order against the stored keys.
    fn check(store: &BTreeMap<EndpointKey, Endpoint>, changes: &Changes) -> Result<(), ProviderError> {
        let mut keys: BTreeSet<EndpointKey> = store.keys().cloned().collect();
        for op in changes.ordered() {
            match op {
                Operation::Create(ep) => {
                    if !keys.insert(ep.key()) {
                        return Err(ProviderError::permanent(format!("record {} already exists", ep.key())));
                    }
                }
                Operation::Delete(ep) => {
                    if !keys.remove(&ep.key()) {
                        return Err(ProviderError::permanent(format!("record {} not found", ep.key())));
                    }
                }
                Operation::Update(u) => {
                    if !keys.remove(&u.old.key()) {
                        return Err(ProviderError::permanent(format!("record {} not found", u.old.key())));
                    }
                    keys.insert(u.new.key());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        let store = self.store.lock().await;
        Ok(store
            .values()
            .filter(|ep| self.domain_filter.matches(&ep.dns_name))
            .cloned()
            .collect())
    }

    async fn apply_changes(&self, changes: &Changes) -> Result<(), ProviderError> {
        let mut store = self.store.lock().await;

        let per_zone = group_by_zone(&self.zones, changes.clone());
        for (zone, zone_changes) in &per_zone {
            Self::check(&store, zone_changes)?;

            for op in zone_changes.ordered() {
                let verb = if self.dry_run { "would" } else { "will" };
                match op {
                    Operation::Delete(ep) => info!("{verb} DELETE {ep} in zone {zone}"),
                    Operation::Update(u) => info!("{verb} UPDATE {} → {} in zone {zone}", u.old, u.new),
                    Operation::Create(ep) => info!("{verb} CREATE {ep} in zone {zone}"),
                }
            }
        }

        if self.dry_run {
            return Ok(());
        }

        for zone_changes in per_zone.into_values() {
            for op in zone_changes.ordered() {
                match op {
                    Operation::Delete(ep) => {
                        store.remove(&ep.key());
                    }
                    Operation::Update(u) => {
                        store.remove(&u.old.key());
                        store.insert(u.new.key(), u.new.clone());
                    }
                    Operation::Create(ep) => {
                        store.insert(ep.key(), ep.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn domain_filter(&self) -> DomainFilter {
        self.domain_filter.clone()
    }
}
