pub mod config;
pub mod controller;
pub mod domain_filter;
pub mod endpoint;
pub mod plan;
pub mod provider;
pub mod registry;
pub mod source;
pub mod telemetry;
pub mod webhook;

pub use controller::{Controller, ControllerError, CycleOutcome};
pub use endpoint::{Endpoint, EndpointKey, RecordType, Ttl};
pub use plan::{Changes, Plan, Policy, Update};
