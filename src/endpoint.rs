use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// external-dns endpoint model
// ─────────────────────────────────────────────────────────────────────────────

/// Ownership and bookkeeping labels carried by an endpoint.
pub type Labels = BTreeMap<String, String>;

/// Label holding the owner identifier of a managed record.
pub const OWNER_LABEL: &str = "owner";
/// Label holding the cluster resource that produced a record.
pub const RESOURCE_LABEL: &str = "resource";

/// DNS record type. Unknown types are preserved verbatim (upper-cased).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordType {
    #[default]
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Srv,
    Txt,
    Ptr,
    Caa,
    Naptr,
    Https,
    Other(String),
}

impl RecordType {
    pub fn as_str(&self) -> &str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
            RecordType::Srv => "SRV",
            RecordType::Txt => "TXT",
            RecordType::Ptr => "PTR",
            RecordType::Caa => "CAA",
            RecordType::Naptr => "NAPTR",
            RecordType::Https => "HTTPS",
            RecordType::Other(s) => s,
        }
    }
}

impl From<&str> for RecordType {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            "CNAME" => RecordType::Cname,
            "MX" => RecordType::Mx,
            "NS" => RecordType::Ns,
            "SRV" => RecordType::Srv,
            "TXT" => RecordType::Txt,
            "PTR" => RecordType::Ptr,
            "CAA" => RecordType::Caa,
            "NAPTR" => RecordType::Naptr,
            "HTTPS" => RecordType::Https,
            other => RecordType::Other(other.to_string()),
        }
    }
}

impl From<String> for RecordType {
    fn from(s: String) -> Self {
        RecordType::from(s.as_str())
    }
}

impl From<RecordType> for String {
    fn from(rt: RecordType) -> Self {
        rt.as_str().to_string()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record TTL in seconds. Zero means "unconfigured, use the provider default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ttl(pub u32);

impl Ttl {
    pub fn is_configured(self) -> bool {
        self.0 > 0
    }

    /// The configured TTL, or `default` when unset.
    pub fn or(self, default: u32) -> u32 {
        if self.is_configured() {
            self.0
        } else {
            default
        }
    }
}

/// A provider-specific property attached to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderSpecific {
    pub name: String,
    pub value: String,
}

/// One DNS endpoint as external-dns understands it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub dns_name: String,
    pub record_type: RecordType,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default, rename = "recordTTL")]
    pub record_ttl: Ttl,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub provider_specific: Vec<ProviderSpecific>,
    #[serde(default)]
    pub set_identifier: String,
}

/// Identity of a logical endpoint within one zone.
///
/// Names are compared case-insensitively and without a trailing dot; the
/// endpoint itself keeps whatever spelling its producer used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    pub dns_name: String,
    pub record_type: RecordType,
    pub set_identifier: String,
}

impl EndpointKey {
    pub fn new(dns_name: &str, record_type: RecordType, set_identifier: &str) -> Self {
        Self {
            dns_name: normalize_name(dns_name),
            record_type,
            set_identifier: set_identifier.to_string(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.record_type, self.dns_name)?;
        if !self.set_identifier.is_empty() {
            write!(f, " [{}]", self.set_identifier)?;
        }
        Ok(())
    }
}

/// Lower-case a DNS name and strip its trailing dot.
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

impl Endpoint {
    pub fn new<I, S>(dns_name: &str, record_type: RecordType, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dns_name: dns_name.to_string(),
            record_type,
            targets: targets.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.record_ttl = Ttl(ttl);
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_set_identifier(mut self, set_identifier: &str) -> Self {
        self.set_identifier = set_identifier.to_string();
        self
    }

    pub fn with_provider_specific(mut self, name: &str, value: &str) -> Self {
        self.set_provider_specific(name, value);
        self
    }

    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(&self.dns_name, self.record_type.clone(), &self.set_identifier)
    }

    /// Owner identifier stamped by the registry, empty when unowned.
    pub fn owner(&self) -> &str {
        self.labels.get(OWNER_LABEL).map(String::as_str).unwrap_or("")
    }

    /// Find a value in the providerSpecific list by property name.
    pub fn provider_specific(&self, name: &str) -> Option<&str> {
        self.provider_specific
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn set_provider_specific(&mut self, name: &str, value: &str) {
        match self.provider_specific.iter_mut().find(|p| p.name == name) {
            Some(p) => p.value = value.to_string(),
            None => self.provider_specific.push(ProviderSpecific {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Targets sorted and deduplicated.
    pub fn sorted_targets(&self) -> Vec<String> {
        let mut targets = self.targets.clone();
        targets.sort();
        targets.dedup();
        targets
    }

    /// Order-insensitive target comparison.
    pub fn same_targets(&self, other: &Endpoint) -> bool {
        self.sorted_targets() == other.sorted_targets()
    }

    /// Order-insensitive providerSpecific comparison.
    pub fn same_provider_specific(&self, other: &Endpoint) -> bool {
        let mut a = self.provider_specific.clone();
        let mut b = other.provider_specific.clone();
        a.sort();
        b.sort();
        a == b
    }

    /// Check that every target is well formed for the record type.
    pub fn validate(&self) -> Result<(), EndpointError> {
        if self.targets.is_empty() {
            return Err(EndpointError::NoTargets { key: self.key() });
        }
        if self.record_type == RecordType::Cname && self.targets.len() != 1 {
            return Err(EndpointError::SingleTargetRequired {
                key: self.key(),
                count: self.targets.len(),
            });
        }
        for target in &self.targets {
            if let Err(reason) = check_target(&self.record_type, target) {
                return Err(EndpointError::InvalidTarget {
                    key: self.key(),
                    target: target.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// Fold another endpoint with the same key into this one.
    ///
    /// Targets are unioned, the first configured TTL wins, and labels or
    /// provider properties already present are kept.
    fn absorb(&mut self, other: Endpoint) {
        for target in other.targets {
            if !self.targets.contains(&target) {
                self.targets.push(target);
            }
        }
        if !self.record_ttl.is_configured() {
            self.record_ttl = other.record_ttl;
        }
        for (k, v) in other.labels {
            self.labels.entry(k).or_insert(v);
        }
        for ps in other.provider_specific {
            if self.provider_specific(&ps.name).is_none() {
                self.provider_specific.push(ps);
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} [{}]", self.dns_name, self.record_ttl.0, self.record_type, self.targets.join(","))?;
        if !self.set_identifier.is_empty() {
            write!(f, " set={}", self.set_identifier)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("{key} has no targets")]
    NoTargets { key: EndpointKey },

    #[error("{key} must have exactly one target, got {count}")]
    SingleTargetRequired { key: EndpointKey, count: usize },

    #[error("{key} has invalid target '{target}': {reason}")]
    InvalidTarget {
        key: EndpointKey,
        target: String,
        reason: &'static str,
    },
}

fn check_target(record_type: &RecordType, target: &str) -> Result<(), &'static str> {
    match record_type {
        RecordType::A => target
            .parse::<Ipv4Addr>()
            .map(|_| ())
            .map_err(|_| "not an IPv4 address"),
        RecordType::Aaaa => target
            .parse::<Ipv6Addr>()
            .map(|_| ())
            .map_err(|_| "not an IPv6 address"),
        RecordType::Cname | RecordType::Ns | RecordType::Ptr => {
            if is_hostname(target) {
                Ok(())
            } else {
                Err("not a host name")
            }
        }
        // "<preference> <exchange>"
        RecordType::Mx => match target.split_whitespace().collect::<Vec<_>>().as_slice() {
            [preference, exchange] if preference.parse::<u16>().is_ok() && is_hostname(exchange) => Ok(()),
            _ => Err("expected '<preference> <host>'"),
        },
        // "<priority> <weight> <port> <target>"
        RecordType::Srv => match target.split_whitespace().collect::<Vec<_>>().as_slice() {
            [priority, weight, port, host]
                if priority.parse::<u16>().is_ok()
                    && weight.parse::<u16>().is_ok()
                    && port.parse::<u16>().is_ok()
                    && is_hostname(host) =>
            {
                Ok(())
            }
            _ => Err("expected '<priority> <weight> <port> <host>'"),
        },
        _ => {
            if target.is_empty() {
                Err("empty target")
            } else {
                Ok(())
            }
        }
    }
}

fn is_hostname(s: &str) -> bool {
    let name = s.trim_end_matches('.');
    !name.is_empty()
        && !name.contains(char::is_whitespace)
        && name.split('.').all(|label| !label.is_empty() && label.len() <= 63)
}

/// Collapse endpoints that share a key into one multi-target endpoint.
///
/// Output keeps the order in which keys were first seen; targets of each
/// merged endpoint are sorted. The first configured TTL in input order wins.
pub fn merge_endpoints(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut order: Vec<EndpointKey> = Vec::new();
    let mut merged: HashMap<EndpointKey, Endpoint> = HashMap::new();

    for ep in endpoints {
        let key = ep.key();
        match merged.get_mut(&key) {
            Some(existing) => existing.absorb(ep),
            None => {
                order.push(key.clone());
                merged.insert(key, ep);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| merged.remove(&key))
        .map(|mut ep| {
            ep.targets = ep.sorted_targets();
            ep
        })
        .collect()
}
