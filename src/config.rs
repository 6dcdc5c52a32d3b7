use std::{str::FromStr, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    domain_filter::{DomainFilter, FilterError, ZoneFilter, ZoneIdFilter, ZoneTypeFilter},
    endpoint::RecordType,
    plan::{Policy, UnknownPolicy},
    provider::PdnsConfig,
    registry::{RegistryError, TxtNameMapper},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading configuration from the environment: {0}")]
    Env(#[from] envy::Error),

    #[error("OWNER_ID must not be empty when REGISTRY=txt")]
    EmptyOwner,

    #[error("TXT_PREFIX and TXT_SUFFIX are mutually exclusive")]
    PrefixAndSuffix,

    #[error("PDNS_API_KEY must be set")]
    MissingApiKey,

    #[error("unknown registry '{0}', expected 'txt' or 'noop'")]
    UnknownRegistry(String),

    #[error("unsupported record type '{0}' in MANAGED_RECORD_TYPES")]
    UnknownRecordType(String),

    #[error(transparent)]
    Policy(#[from] UnknownPolicy),

    #[error(transparent)]
    ZoneType(#[from] FilterError),

    #[error(transparent)]
    Registry(RegistryError),
}

impl From<RegistryError> for ConfigError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::EmptyOwner => ConfigError::EmptyOwner,
            RegistryError::PrefixAndSuffix => ConfigError::PrefixAndSuffix,
            other => ConfigError::Registry(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Txt,
    Noop,
}

impl FromStr for RegistryKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" => Ok(RegistryKind::Txt),
            "noop" => Ok(RegistryKind::Noop),
            other => Err(ConfigError::UnknownRegistry(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the PowerDNS HTTP API, e.g. http://powerdns:8081
    #[serde(default = "default_pdns_url")]
    pub pdns_api_url: String,

    /// PowerDNS API key (X-API-Key header)
    #[serde(default)]
    pub pdns_api_key: String,

    /// PowerDNS server-id, almost always "localhost"
    #[serde(default = "default_server_id")]
    pub pdns_server_id: String,

    /// Skip certificate verification when talking to PowerDNS over TLS
    #[serde(default)]
    pub pdns_skip_tls_verify: bool,

    /// Comma-separated list of domains to manage; empty = manage all
    #[serde(default)]
    pub domain_filter: String,

    /// Comma-separated list of domains to leave alone
    #[serde(default)]
    pub exclude_domains: String,

    /// Comma-separated list of zone ids to manage; empty = all
    #[serde(default)]
    pub zone_id_filter: String,

    /// "public", "private" or empty for both
    #[serde(default)]
    pub zone_type_filter: String,

    /// Default TTL when the endpoint doesn't specify one
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,

    /// Port the webhook server listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Plan and log changes without calling any mutating API
    #[serde(default)]
    pub dry_run: bool,

    /// Identifier written into ownership records
    #[serde(default = "default_owner_id")]
    pub owner_id: String,

    /// "txt" or "noop"
    #[serde(default = "default_registry")]
    pub registry: String,

    #[serde(default)]
    pub txt_prefix: String,

    #[serde(default)]
    pub txt_suffix: String,

    /// Replaces a leading "*" label in ownership record names
    #[serde(default)]
    pub txt_wildcard_replacement: String,

    /// "sync", "upsert-only" or "create-only"
    #[serde(default = "default_policy")]
    pub policy: String,

    /// Comma-separated record types the controller manages
    #[serde(default = "default_managed_types")]
    pub managed_record_types: String,

    /// Take over records that have no ownership record
    #[serde(default)]
    pub adopt_unowned: bool,

    /// Seconds between reconciliation cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Seconds the zone list is cached; 0 disables caching
    #[serde(default = "default_zones_cache")]
    pub zones_cache_secs: u64,

    /// Retries per PowerDNS API call after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Max operations per PATCH; 0 = unlimited
    #[serde(default)]
    pub batch_change_size: usize,

    /// JSON file of desired endpoints read by the controller
    #[serde(default = "default_source_file")]
    pub source_file: String,
}

impl Config {
    /// Parse from environment variables (PDNS_API_URL, PDNS_API_KEY, …)
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::from_env::<Config>()?)
    }

    /// Check every knob before the first cycle runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pdns_api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.registry_kind()? == RegistryKind::Txt {
            self.txt_name_mapper()?;
            if self.owner_id.trim().is_empty() {
                return Err(ConfigError::EmptyOwner);
            }
        }
        self.policy()?;
        self.zone_type()?;
        self.managed_types()?;
        Ok(())
    }

    pub fn domain_filter_list(&self) -> Vec<String> {
        split_list(&self.domain_filter)
    }

    pub fn exclude_domains_list(&self) -> Vec<String> {
        split_list(&self.exclude_domains)
    }

    pub fn zone_id_filter_list(&self) -> Vec<String> {
        split_list(&self.zone_id_filter)
    }

    pub fn domain_filters(&self) -> DomainFilter {
        DomainFilter::with_exclusions(self.domain_filter_list(), self.exclude_domains_list())
    }

    pub fn zone_type(&self) -> Result<ZoneTypeFilter, ConfigError> {
        Ok(self.zone_type_filter.parse()?)
    }

    pub fn zone_filter(&self) -> Result<ZoneFilter, ConfigError> {
        Ok(ZoneFilter {
            domains: self.domain_filters(),
            ids: ZoneIdFilter::new(self.zone_id_filter_list()),
            zone_type: self.zone_type()?,
        })
    }

    pub fn policy(&self) -> Result<Policy, ConfigError> {
        Ok(self.policy.parse()?)
    }

    pub fn registry_kind(&self) -> Result<RegistryKind, ConfigError> {
        self.registry.parse()
    }

    pub fn managed_types(&self) -> Result<Vec<RecordType>, ConfigError> {
        split_list(&self.managed_record_types)
            .into_iter()
            .map(|t| match RecordType::from(t.as_str()) {
                RecordType::Other(name) => Err(ConfigError::UnknownRecordType(name)),
                known => Ok(known),
            })
            .collect()
    }

    pub fn txt_name_mapper(&self) -> Result<TxtNameMapper, ConfigError> {
        Ok(TxtNameMapper::new(
            &self.txt_prefix,
            &self.txt_suffix,
            &self.txt_wildcard_replacement,
        )?)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn pdns(&self) -> Result<PdnsConfig, ConfigError> {
        Ok(PdnsConfig {
            api_url: self.pdns_api_url.clone(),
            api_key: self.pdns_api_key.clone(),
            server_id: self.pdns_server_id.clone(),
            skip_tls_verify: self.pdns_skip_tls_verify,
            default_ttl: self.default_ttl,
            dry_run: self.dry_run,
            zone_filter: self.zone_filter()?,
            zones_cache_duration: Duration::from_secs(self.zones_cache_secs),
            max_retries: self.max_retries,
            batch_change_size: self.batch_change_size,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn default_pdns_url()       -> String { "http://localhost:8081".into() }
fn default_server_id()      -> String { "localhost".into() }
fn default_ttl()            -> u32    { 300 }
fn default_port()           -> u16    { 8888 }
fn default_owner_id()       -> String { "default".into() }
fn default_registry()       -> String { "txt".into() }
fn default_policy()         -> String { "sync".into() }
fn default_managed_types()  -> String { "A,AAAA,CNAME".into() }
fn default_interval()       -> u64    { 60 }
fn default_zones_cache()    -> u64    { 0 }
fn default_max_retries()    -> u32    { 3 }
fn default_source_file()    -> String { "endpoints.json".into() }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string()));
        envy::from_iter(vars).unwrap()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[("PDNS_API_KEY", "secret")]);
        assert_eq!(cfg.pdns_api_url, "http://localhost:8081");
        assert_eq!(cfg.default_ttl, 300);
        assert_eq!(cfg.port, 8888);
        assert_eq!(cfg.owner_id, "default");
        assert_eq!(cfg.registry_kind().unwrap(), RegistryKind::Txt);
        assert_eq!(cfg.policy().unwrap(), Policy::Sync);
        assert_eq!(
            cfg.managed_types().unwrap(),
            vec![RecordType::A, RecordType::Aaaa, RecordType::Cname]
        );
        assert!(!cfg.domain_filters().is_configured());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn lists_are_comma_separated() {
        let cfg = config(&[
            ("PDNS_API_KEY", "secret"),
            ("DOMAIN_FILTER", "example.com, example.org ,"),
            ("EXCLUDE_DOMAINS", "internal.example.com"),
            ("ZONE_ID_FILTER", "example.com."),
            ("ZONE_TYPE_FILTER", "public"),
            ("MANAGED_RECORD_TYPES", "A,TXT,mx"),
        ]);
        assert_eq!(cfg.domain_filter_list(), vec!["example.com", "example.org"]);
        let filter = cfg.domain_filters();
        assert!(filter.matches("www.example.com"));
        assert!(!filter.matches("db.internal.example.com"));

        let pdns = cfg.pdns().unwrap();
        assert_eq!(pdns.zone_filter.zone_type, ZoneTypeFilter::Public);
        assert!(pdns.zone_filter.ids.matches("example.com."));
        assert_eq!(
            cfg.managed_types().unwrap(),
            vec![RecordType::A, RecordType::Txt, RecordType::Mx]
        );
    }

    #[test]
    fn validate_rejects_bad_knobs() {
        let cases: &[&[(&str, &str)]] = &[
            &[],
            &[("PDNS_API_KEY", "k"), ("OWNER_ID", " ")],
            &[("PDNS_API_KEY", "k"), ("TXT_PREFIX", "p-"), ("TXT_SUFFIX", "-s")],
            &[("PDNS_API_KEY", "k"), ("POLICY", "delete-everything")],
            &[("PDNS_API_KEY", "k"), ("ZONE_TYPE_FILTER", "secret")],
            &[("PDNS_API_KEY", "k"), ("MANAGED_RECORD_TYPES", "A,BOGUS")],
            &[("PDNS_API_KEY", "k"), ("REGISTRY", "dynamodb")],
        ];
        for vars in cases {
            assert!(config(vars).validate().is_err(), "{vars:?} should be rejected");
        }
    }

    #[test]
    fn registry_errors_keep_their_meaning() {
        assert!(matches!(ConfigError::from(RegistryError::EmptyOwner), ConfigError::EmptyOwner));
        assert!(matches!(
            ConfigError::from(RegistryError::PrefixAndSuffix),
            ConfigError::PrefixAndSuffix
        ));
        let provider = RegistryError::Provider(ProviderError::soft("timeout"));
        assert!(matches!(ConfigError::from(provider), ConfigError::Registry(RegistryError::Provider(_))));
    }

    #[test]
    fn noop_registry_does_not_need_an_owner() {
        let cfg = config(&[("PDNS_API_KEY", "k"), ("REGISTRY", "noop"), ("OWNER_ID", "")]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.registry_kind().unwrap(), RegistryKind::Noop);
    }
}
