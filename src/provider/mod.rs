//! The contract every DNS backend implements, plus helpers shared by the
//! adapters in this crate.

pub mod cache;
pub mod inmemory;
pub mod pdns;

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    sync::Arc,
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::{
    domain_filter::{DomainFilter, ZoneIdName},
    endpoint::Endpoint,
    plan::Changes,
};

pub use cache::ZonesCache;
pub use inmemory::InMemoryProvider;
pub use pdns::{PdnsConfig, PdnsProvider};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Rate limits, timeouts, 5xx: skip this cycle and try again later.
    #[error("transient provider failure: {0}")]
    Soft(String),

    /// Bad credentials, rejected requests, inconsistent changes.
    #[error("provider failure: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn soft(msg: impl Display) -> Self {
        ProviderError::Soft(msg.to_string())
    }

    pub fn permanent(msg: impl Display) -> Self {
        ProviderError::Permanent(msg.to_string())
    }

    pub fn is_soft(&self) -> bool {
        matches!(self, ProviderError::Soft(_))
    }
}

/// A DNS backend.
///
/// `records` returns the complete state of every managed zone, collapsed
/// to one endpoint per key. `apply_changes` must honour dry-run by making
/// no mutating calls at all.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError>;

    async fn apply_changes(&self, changes: &Changes) -> Result<(), ProviderError>;

    /// Drop endpoints this backend cannot represent before they are planned.
    async fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>, ProviderError> {
        Ok(valid_endpoints(endpoints))
    }

    fn domain_filter(&self) -> DomainFilter {
        DomainFilter::default()
    }
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        (**self).records().await
    }

    async fn apply_changes(&self, changes: &Changes) -> Result<(), ProviderError> {
        (**self).apply_changes(changes).await
    }

    async fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>, ProviderError> {
        (**self).adjust_endpoints(endpoints).await
    }

    fn domain_filter(&self) -> DomainFilter {
        (**self).domain_filter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Keep only endpoints whose targets are valid for their record type.
pub fn valid_endpoints(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    endpoints
        .into_iter()
        .filter(|ep| match ep.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!("ignoring endpoint because of invalid record formatting: {e}");
                false
            }
        })
        .collect()
}

pub fn ensure_trailing_dot(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Split changes per zone id, routing each endpoint to its most specific
/// zone. Endpoints with no matching zone are dropped with a warning.
pub fn group_by_zone(zones: &ZoneIdName, changes: Changes) -> BTreeMap<String, Changes> {
    let mut grouped: BTreeMap<String, Changes> = BTreeMap::new();
    let mut unroutable: BTreeSet<String> = BTreeSet::new();

    let mut route = |name: &str| -> Option<String> {
        match zones.find_zone(name) {
            Some((id, _)) => Some(id.to_string()),
            None => {
                unroutable.insert(name.to_string());
                None
            }
        }
    };

    for ep in changes.delete {
        if let Some(zone) = route(&ep.dns_name) {
            grouped.entry(zone).or_default().delete.push(ep);
        }
    }
    for u in changes.update {
        if let Some(zone) = route(&u.new.dns_name) {
            grouped.entry(zone).or_default().update.push(u);
        }
    }
    for ep in changes.create {
        if let Some(zone) = route(&ep.dns_name) {
            grouped.entry(zone).or_default().create.push(ep);
        }
    }

    for name in unroutable {
        warn!("no matching zone found for {name}; skipping");
    }
    grouped
}
