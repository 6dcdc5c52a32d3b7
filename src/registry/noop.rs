use async_trait::async_trait;

use crate::{
    domain_filter::DomainFilter,
    endpoint::Endpoint,
    plan::Changes,
    provider::Provider,
    registry::{Registry, RegistryError},
};

/// Passes everything straight through. With no ownership records, every
/// unlabelled record is treated as managed by this instance.
pub struct NoopRegistry<P> {
    provider: P,
}

impl<P: Provider> NoopRegistry<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: Provider> Registry for NoopRegistry<P> {
    async fn records(&self) -> Result<Vec<Endpoint>, RegistryError> {
        Ok(self.provider.records().await?)
    }

    async fn apply_changes(&self, changes: Changes) -> Result<(), RegistryError> {
        Ok(self.provider.apply_changes(&changes).await?)
    }

    async fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>, RegistryError> {
        Ok(self.provider.adjust_endpoints(endpoints).await?)
    }

    fn owner_id(&self) -> &str {
        ""
    }

    fn domain_filter(&self) -> DomainFilter {
        self.provider.domain_filter()
    }
}
