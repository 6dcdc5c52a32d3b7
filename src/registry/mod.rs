//! Ownership bookkeeping between the planner and a provider.
//!
//! A registry decides which published records this controller instance may
//! touch. It annotates the records it hands to the planner with an owner
//! label and turns the planner's changes into provider changes, adding the
//! side records it needs to remember ownership.

pub mod noop;
pub mod txt;

use async_trait::async_trait;
use thiserror::Error;

use crate::{domain_filter::DomainFilter, endpoint::Endpoint, plan::Changes, provider::ProviderError};

pub use noop::NoopRegistry;
pub use txt::{TxtNameMapper, TxtRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("owner id must not be empty")]
    EmptyOwner,

    #[error("txt prefix and txt suffix are mutually exclusive")]
    PrefixAndSuffix,
}

impl RegistryError {
    pub fn is_soft(&self) -> bool {
        matches!(self, RegistryError::Provider(e) if e.is_soft())
    }
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// Published records with the owner label resolved. Bookkeeping records
    /// are not returned.
    async fn records(&self) -> Result<Vec<Endpoint>, RegistryError>;

    async fn apply_changes(&self, changes: Changes) -> Result<(), RegistryError>;

    async fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>, RegistryError>;

    /// Owner identifier the planner must stamp on records it creates.
    fn owner_id(&self) -> &str;

    fn domain_filter(&self) -> DomainFilter;
}

#[async_trait]
impl<R: Registry + ?Sized> Registry for Box<R> {
    async fn records(&self) -> Result<Vec<Endpoint>, RegistryError> {
        (**self).records().await
    }

    async fn apply_changes(&self, changes: Changes) -> Result<(), RegistryError> {
        (**self).apply_changes(changes).await
    }

    async fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>, RegistryError> {
        (**self).adjust_endpoints(endpoints).await
    }

    fn owner_id(&self) -> &str {
        (**self).owner_id()
    }

    fn domain_filter(&self) -> DomainFilter {
        (**self).domain_filter()
    }
}
