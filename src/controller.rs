//! The reconciliation loop: source → registry → plan → provider.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::{
    sync::watch,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    domain_filter::DomainFilter,
    endpoint::RecordType,
    plan::{Changes, Plan, PlanError, Policy, DEFAULT_MANAGED_TYPES},
    registry::{Registry, RegistryError},
    source::Source,
};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("collecting desired endpoints: {0:#}")]
    Source(anyhow::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

impl ControllerError {
    /// Whether the next cycle may succeed without intervention.
    pub fn is_soft(&self) -> bool {
        match self {
            ControllerError::Source(_) => true,
            ControllerError::Registry(e) => e.is_soft(),
            ControllerError::Plan(_) => false,
        }
    }
}

/// What one cycle decided to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl CycleOutcome {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

impl From<&Changes> for CycleOutcome {
    fn from(changes: &Changes) -> Self {
        Self {
            created: changes.create.len(),
            updated: changes.update.len(),
            deleted: changes.delete.len(),
        }
    }
}

pub struct Controller<S, R> {
    source: S,
    registry: R,
    domain_filter: DomainFilter,
    managed_types: Vec<RecordType>,
    policy: Policy,
    adopt_unowned: bool,
    interval: Duration,
}

impl<S: Source, R: Registry> Controller<S, R> {
    pub fn new(source: S, registry: R) -> Self {
        let domain_filter = registry.domain_filter();
        Self {
            source,
            registry,
            domain_filter,
            managed_types: DEFAULT_MANAGED_TYPES.to_vec(),
            policy: Policy::default(),
            adopt_unowned: false,
            interval: Duration::from_secs(60),
        }
    }

    pub fn domain_filter(mut self, filter: DomainFilter) -> Self {
        self.domain_filter = filter;
        self
    }

    pub fn managed_types(mut self, types: Vec<RecordType>) -> Self {
        self.managed_types = types;
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn adopt_unowned(mut self, adopt: bool) -> Self {
        self.adopt_unowned = adopt;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run a single reconciliation cycle.
    pub async fn run_once(&self) -> Result<CycleOutcome, ControllerError> {
        let started = Instant::now();

        let desired = self.source.endpoints().await.map_err(ControllerError::Source)?;
        let desired = self.registry.adjust_endpoints(desired).await?;
        let current = self.registry.records().await?;
        debug!("{} desired, {} current endpoint(s)", desired.len(), current.len());

        let changes = Plan::new(current, desired)
            .owner_id(self.registry.owner_id())
            .domain_filter(self.domain_filter.clone())
            .managed_types(self.managed_types.clone())
            .policy(self.policy)
            .adopt_unowned(self.adopt_unowned)
            .calculate()?;

        let outcome = CycleOutcome::from(&changes);
        if changes.is_empty() {
            info!("all records are already up to date");
            return Ok(outcome);
        }

        info!("applying {changes}");
        self.registry.apply_changes(changes).await?;
        debug!("cycle finished in {:?}", started.elapsed());
        Ok(outcome)
    }

    /// Reconcile every `interval` until `shutdown` changes or its sender is
    /// dropped. Soft failures skip the cycle; anything else ends the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ControllerError> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!("shutdown requested, stopping reconciliation");
                    return Ok(());
                }
            }

            match self.run_once().await {
                Ok(_) => {}
                Err(e) if e.is_soft() => warn!("skipping cycle: {e}"),
                Err(e) => {
                    error!("reconciliation failed: {e}");
                    return Err(e);
                }
            }
        }
    }
}
