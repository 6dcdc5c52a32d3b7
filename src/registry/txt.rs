//! Ownership recorded in sidecar TXT records.
//!
//! Every managed record `foo.example.com A` is accompanied by a TXT record
//! (by default `a-foo.example.com`) whose content lists the owner:
//!
//! ```text
//! "heritage=external-dns,external-dns/owner=<id>,external-dns/resource=<r>"
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    domain_filter::DomainFilter,
    endpoint::{normalize_name, Endpoint, EndpointKey, Labels, RecordType, OWNER_LABEL, RESOURCE_LABEL},
    plan::{Changes, Update},
    provider::Provider,
    registry::{Registry, RegistryError},
};

const HERITAGE: &str = "external-dns";
const LABEL_PREFIX: &str = "external-dns/";
const RECORD_TYPE_PLACEHOLDER: &str = "%{record_type}";

/// Types a marker name can carry, longest first so templated affixes
/// resolve to the most specific type.
const MARKED_TYPES: [&str; 11] = [
    "naptr", "cname", "https", "aaaa", "txt", "srv", "ptr", "caa", "mx", "ns", "a",
];

// ─────────────────────────────────────────────────────────────────────────────
// Marker content
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    #[error("no heritage entry")]
    MissingHeritage,

    #[error("heritage '{0}' is not external-dns")]
    ForeignHeritage(String),

    #[error("malformed entry '{0}'")]
    Malformed(String),
}

/// Render labels as marker content, quoted for the TXT wire form.
pub fn serialize_labels(labels: &Labels) -> String {
    let mut parts = vec![format!("heritage={HERITAGE}")];
    parts.extend(labels.iter().map(|(k, v)| format!("{LABEL_PREFIX}{k}={v}")));
    format!("\"{}\"", parts.join(","))
}

/// Parse marker content. Surrounding quotes are optional; entries without the
/// `external-dns/` prefix other than the heritage are ignored.
pub fn parse_labels(text: &str) -> Result<Labels, MarkerError> {
    let text = text.trim().trim_matches('"');
    let mut labels = Labels::new();
    let mut heritage = false;

    for entry in text.split(',') {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| MarkerError::Malformed(entry.to_string()))?;
        if key == "heritage" {
            if value != HERITAGE {
                return Err(MarkerError::ForeignHeritage(value.to_string()));
            }
            heritage = true;
        } else if let Some(key) = key.strip_prefix(LABEL_PREFIX) {
            labels.insert(key.to_string(), value.to_string());
        }
    }

    if !heritage {
        return Err(MarkerError::MissingHeritage);
    }
    Ok(labels)
}

// ─────────────────────────────────────────────────────────────────────────────
// Marker names
// ─────────────────────────────────────────────────────────────────────────────

/// Maps record names to marker names and back.
///
/// With a prefix the marker is `<prefix><type>-<name>`; with a suffix it is
/// `<type>-<first label><suffix>.<rest>`. Either affix may contain
/// `%{record_type}`, which then takes the place of the `<type>-` part.
#[derive(Debug, Clone, Default)]
pub struct TxtNameMapper {
    prefix: String,
    suffix: String,
    wildcard_replacement: String,
}

impl TxtNameMapper {
    pub fn new(prefix: &str, suffix: &str, wildcard_replacement: &str) -> Result<Self, RegistryError> {
        if !prefix.is_empty() && !suffix.is_empty() {
            return Err(RegistryError::PrefixAndSuffix);
        }
        Ok(Self {
            prefix: prefix.to_ascii_lowercase(),
            suffix: suffix.to_ascii_lowercase(),
            wildcard_replacement: wildcard_replacement.to_ascii_lowercase(),
        })
    }

    pub fn to_txt_name(&self, name: &str, record_type: &RecordType) -> String {
        let name = self.replace_wildcard(&normalize_name(name));
        let rtype = record_type.as_str().to_ascii_lowercase();

        if self.suffix.is_empty() {
            return if self.prefix.contains(RECORD_TYPE_PLACEHOLDER) {
                format!("{}{name}", self.prefix.replace(RECORD_TYPE_PLACEHOLDER, &rtype))
            } else {
                format!("{}{rtype}-{name}", self.prefix)
            };
        }

        let (first, rest) = match name.split_once('.') {
            Some((first, rest)) => (first, format!(".{rest}")),
            None => (name.as_str(), String::new()),
        };
        if self.suffix.contains(RECORD_TYPE_PLACEHOLDER) {
            format!("{first}{}{rest}", self.suffix.replace(RECORD_TYPE_PLACEHOLDER, &rtype))
        } else {
            format!("{rtype}-{first}{}{rest}", self.suffix)
        }
    }

    /// The record name and type a marker name refers to. Markers written
    /// without a type apply to every type at that name.
    pub fn to_endpoint_name(&self, txt_name: &str) -> Option<(String, Option<RecordType>)> {
        let txt = normalize_name(txt_name);
        let (name, record_type) = if self.suffix.is_empty() {
            self.strip_prefix(&txt)?
        } else {
            self.strip_suffix(&txt)?
        };
        if name.is_empty() {
            return None;
        }
        Some((self.restore_wildcard(&name), record_type))
    }

    fn strip_prefix(&self, txt: &str) -> Option<(String, Option<RecordType>)> {
        if self.prefix.contains(RECORD_TYPE_PLACEHOLDER) {
            return MARKED_TYPES.iter().find_map(|t| {
                txt.strip_prefix(self.prefix.replace(RECORD_TYPE_PLACEHOLDER, t).as_str())
                    .map(|name| (name.to_string(), Some(RecordType::from(*t))))
            });
        }
        txt.strip_prefix(self.prefix.as_str()).map(split_type)
    }

    fn strip_suffix(&self, txt: &str) -> Option<(String, Option<RecordType>)> {
        if self.suffix.contains(RECORD_TYPE_PLACEHOLDER) {
            return MARKED_TYPES.iter().find_map(|t| {
                let (head, rest) = split_affix(txt, &self.suffix.replace(RECORD_TYPE_PLACEHOLDER, t))?;
                Some((format!("{head}{rest}"), Some(RecordType::from(*t))))
            });
        }
        let (head, rest) = split_affix(txt, &self.suffix)?;
        let (label, record_type) = split_type(head);
        Some((format!("{label}{rest}"), record_type))
    }

    fn replace_wildcard(&self, name: &str) -> String {
        if self.wildcard_replacement.is_empty() {
            return name.to_string();
        }
        match name.strip_prefix('*') {
            Some(rest) if rest.is_empty() || rest.starts_with('.') => format!("{}{rest}", self.wildcard_replacement),
            _ => name.to_string(),
        }
    }

    fn restore_wildcard(&self, name: &str) -> String {
        if self.wildcard_replacement.is_empty() {
            return name.to_string();
        }
        match name.strip_prefix(self.wildcard_replacement.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('.') => format!("*{rest}"),
            _ => name.to_string(),
        }
    }
}

/// `a-foo` → (`foo`, A); anything else is an untyped name.
fn split_type(label: &str) -> (String, Option<RecordType>) {
    for t in MARKED_TYPES {
        if let Some(rest) = label.strip_prefix(t).and_then(|r| r.strip_prefix('-')) {
            if !rest.is_empty() {
                return (rest.to_string(), Some(RecordType::from(t)));
            }
        }
    }
    (label.to_string(), None)
}

/// Split `<head><affix>.<rest>` into `(head, ".rest")`; head is one label.
fn split_affix<'a>(txt: &'a str, affix: &str) -> Option<(&'a str, &'a str)> {
    if let Some(pos) = txt.find(&format!("{affix}.")) {
        let head = &txt[..pos];
        if !head.is_empty() && !head.contains('.') {
            return Some((head, &txt[pos + affix.len()..]));
        }
    }
    let head = txt.strip_suffix(affix)?;
    (!head.is_empty() && !head.contains('.')).then_some((head, ""))
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// (record name, record type if the marker names one, set identifier)
type MarkerKey = (String, Option<RecordType>, String);

#[derive(Debug, Clone)]
struct Marker {
    labels: Labels,
    /// The TXT record as published.
    endpoint: Endpoint,
}

impl Marker {
    fn owner(&self) -> &str {
        self.labels.get(OWNER_LABEL).map(String::as_str).unwrap_or("")
    }
}

pub struct TxtRegistry<P> {
    provider: P,
    owner_id: String,
    mapper: TxtNameMapper,
    /// Markers seen by the last `records` call.
    markers: Mutex<HashMap<MarkerKey, Marker>>,
}

impl<P: Provider> TxtRegistry<P> {
    pub fn new(provider: P, owner_id: &str, mapper: TxtNameMapper) -> Result<Self, RegistryError> {
        if owner_id.is_empty() {
            return Err(RegistryError::EmptyOwner);
        }
        Ok(Self {
            provider,
            owner_id: owner_id.to_string(),
            mapper,
            markers: Mutex::new(HashMap::new()),
        })
    }

    fn parse_marker(&self, ep: &Endpoint) -> Option<(MarkerKey, Marker)> {
        let content = ep.targets.first()?;
        let labels = match parse_labels(content) {
            Ok(labels) => labels,
            Err(e) => {
                debug!("{} is not an ownership record: {e}", ep.dns_name);
                return None;
            }
        };
        let Some((name, record_type)) = self.mapper.to_endpoint_name(&ep.dns_name) else {
            debug!("ownership record {} does not match the configured affix", ep.dns_name);
            return None;
        };
        let key = (normalize_name(&name), record_type, ep.set_identifier.clone());
        Some((key, Marker { labels, endpoint: ep.clone() }))
    }

    /// The marker this instance publishes next to `ep`.
    fn marker_for(&self, ep: &Endpoint) -> Endpoint {
        let mut labels = Labels::new();
        labels.insert(OWNER_LABEL.to_string(), self.owner_id.clone());
        if let Some(resource) = ep.labels.get(RESOURCE_LABEL) {
            labels.insert(RESOURCE_LABEL.to_string(), resource.clone());
        }

        let txt_name = self.mapper.to_txt_name(&ep.dns_name, &ep.record_type);
        let mut marker = Endpoint::new(&txt_name, RecordType::Txt, [serialize_labels(&labels)]);
        marker.record_ttl = ep.record_ttl;
        marker.set_identifier = ep.set_identifier.clone();
        marker
    }

    /// Make sure `ep` is marked as ours, creating or rewriting its marker.
    fn claim(&self, existing: Option<&Marker>, ep: &Endpoint, out: &mut Changes) {
        let marker = self.marker_for(ep);
        match existing {
            Some(m) if m.owner() == self.owner_id => {}
            Some(m) if m.endpoint.key() == marker.key() => out.update.push(Update {
                old: m.endpoint.clone(),
                new: marker,
            }),
            _ => out.create.push(marker),
        }
    }

    fn is_foreign(&self, owner: &str) -> bool {
        !owner.is_empty() && owner != self.owner_id
    }

    /// Another owner's claim on `name`, through a marker of any type.
    fn foreign_owner_at<'a>(&self, markers: &'a HashMap<MarkerKey, Marker>, name: &str) -> Option<&'a str> {
        let name = normalize_name(name);
        markers
            .iter()
            .filter(|((marked, _, _), _)| *marked == name)
            .map(|(_, marker)| marker.owner())
            .find(|owner| self.is_foreign(owner))
    }
}

fn typed_key(ep: &Endpoint) -> MarkerKey {
    (
        normalize_name(&ep.dns_name),
        Some(ep.record_type.clone()),
        ep.set_identifier.clone(),
    )
}

/// The marker covering `ep`: a typed one first, then a legacy untyped one.
fn lookup<'a>(markers: &'a HashMap<MarkerKey, Marker>, ep: &Endpoint) -> Option<&'a Marker> {
    let (name, record_type, set_identifier) = typed_key(ep);
    markers
        .get(&(name.clone(), record_type, set_identifier.clone()))
        .or_else(|| markers.get(&(name, None, set_identifier)))
}

#[async_trait]
impl<P: Provider> Registry for TxtRegistry<P> {
    async fn records(&self) -> Result<Vec<Endpoint>, RegistryError> {
        let mut markers = HashMap::new();
        let mut records = Vec::new();

        for ep in self.provider.records().await? {
            if ep.record_type == RecordType::Txt {
                if let Some((key, marker)) = self.parse_marker(&ep) {
                    markers.insert(key, marker);
                    continue;
                }
            }
            records.push(ep);
        }

        for ep in &mut records {
            if let Some(marker) = lookup(&markers, ep) {
                ep.labels.extend(marker.labels.clone());
            }
        }

        debug!("{} record(s), {} ownership record(s)", records.len(), markers.len());
        *self.markers.lock().await = markers;
        Ok(records)
    }

    async fn apply_changes(&self, changes: Changes) -> Result<(), RegistryError> {
        let markers = self.markers.lock().await;
        let mut out = Changes::default();

        for ep in changes.create {
            if let Some(owner) = self.foreign_owner_at(&markers, &ep.dns_name) {
                info!("skipping create of {}: name owned by '{owner}'", ep.key());
                continue;
            }
            self.claim(lookup(&markers, &ep), &ep, &mut out);
            out.create.push(ep);
        }

        for u in changes.update {
            let owner = u.old.owner();
            if self.is_foreign(owner) {
                info!("skipping update of {}: owned by '{owner}'", u.old.key());
                continue;
            }
            if owner != self.owner_id {
                self.claim(lookup(&markers, &u.new), &u.new, &mut out);
            }
            out.update.push(u);
        }

        let mut deleted_markers: Vec<EndpointKey> = Vec::new();
        for ep in changes.delete {
            let owner = ep.owner();
            if self.is_foreign(owner) {
                info!("skipping delete of {}: owned by '{owner}'", ep.key());
                continue;
            }
            // Untyped markers may still cover other types at this name.
            if let Some(marker) = markers.get(&typed_key(&ep)) {
                if marker.owner() == self.owner_id && !deleted_markers.contains(&marker.endpoint.key()) {
                    deleted_markers.push(marker.endpoint.key());
                    out.delete.push(marker.endpoint.clone());
                }
            }
            out.delete.push(ep);
        }

        if out.is_empty() {
            return Ok(());
        }
        self.provider.apply_changes(&out).await?;
        Ok(())
    }

    async fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>, RegistryError> {
        Ok(self.provider.adjust_endpoints(endpoints).await?)
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn domain_filter(&self) -> DomainFilter {
        self.provider.domain_filter()
    }
}
