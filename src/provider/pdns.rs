use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    domain_filter::{DomainFilter, Visibility, Zone, ZoneFilter, ZoneIdName},
    endpoint::{normalize_name, Endpoint, RecordType, Ttl},
    plan::Changes,
    provider::{ensure_trailing_dot, group_by_zone, valid_endpoints, Provider, ProviderError, ZonesCache},
};

/// Delay before the first retry; doubled on every further attempt.
const RETRY_AFTER: Duration = Duration::from_millis(250);

// Annotate an Ingress or Service with:
//
//   external-dns.alpha.kubernetes.io/provider-specific-pdns-https-target: "1 . alpn=h2,h3"
//
// external-dns strips the annotation prefix and places the remainder into the
// endpoint's providerSpecific list. The value must be an HTTPS SvcParam
// string (RFC 9460): <priority> <target> [key=value ...]
const HTTPS_TARGET_PROPERTY: &str = "webhook/pdns-https-target";

// ─────────────────────────────────────────────────────────────────────────────
// PowerDNS API shapes (partial – only what we need)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ZoneStub {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ZoneDetail {
    #[serde(default)]
    pub rrsets: Vec<RrSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RrSet {
    pub name: String,
    #[serde(rename = "type")]
    pub rrtype: String,
    /// DELETEs explicitly forbid a TTL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub records: Vec<Record>,
    /// Used in PATCH requests; omit on read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changetype: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub content: String,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeType {
    Delete,
    Replace,
}

impl ChangeType {
    fn as_str(self) -> &'static str {
        match self {
            ChangeType::Delete => "DELETE",
            ChangeType::Replace => "REPLACE",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PdnsConfig {
    /// Base URL of the PowerDNS HTTP API, e.g. http://powerdns:8081
    pub api_url: String,
    pub api_key: String,
    /// PowerDNS server-id, almost always "localhost"
    pub server_id: String,
    /// Accept self-signed or otherwise unverifiable certificates
    pub skip_tls_verify: bool,
    /// TTL used when an endpoint doesn't specify one
    pub default_ttl: u32,
    pub dry_run: bool,
    pub zone_filter: ZoneFilter,
    pub zones_cache_duration: Duration,
    /// Retries after the first failed attempt before giving up with a soft error.
    pub max_retries: u32,
    /// Upper bound on operations sent per PATCH; 0 = unlimited.
    pub batch_change_size: usize,
}

pub struct PdnsProvider {
    http: Client,
    cfg: PdnsConfig,
    zones: Mutex<ZonesCache<Vec<Zone>>>,
}

impl PdnsProvider {
    pub fn new(cfg: PdnsConfig) -> Result<Self, ProviderError> {
        if cfg.api_key.is_empty() {
            return Err(ProviderError::permanent("missing API key for PowerDNS"));
        }
        if cfg.server_id == "localhost" {
            debug!("PowerDNS server id is 'localhost'");
        }
        if cfg.skip_tls_verify {
            warn!("TLS certificate verification is disabled for the PowerDNS API");
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(cfg.skip_tls_verify)
            .build()
            .map_err(|e| ProviderError::permanent(format!("building reqwest client: {e}")))?;
        let zones = Mutex::new(ZonesCache::new(cfg.zones_cache_duration));
        Ok(Self { http, cfg, zones })
    }

    fn base(&self) -> String {
        format!(
            "{}/api/v1/servers/{}",
            self.cfg.api_url.trim_end_matches('/'),
            self.cfg.server_id
        )
    }

    fn api_key(&self) -> &str {
        &self.cfg.api_key
    }

    /// Send a request, retrying transport failures, 429 and 5xx with
    /// exponential backoff. Other 4xx answers (bad credentials, rejected
    /// RRsets) are permanent; anything that outlives the retries is soft.
    async fn send(&self, what: &str, build: impl Fn() -> RequestBuilder) -> Result<Response, ProviderError> {
        let retries = self.cfg.max_retries;
        let mut last_error = String::new();

        for attempt in 0..=retries {
            if attempt > 0 {
                let delay = RETRY_AFTER * 2u32.saturating_pow(attempt - 1);
                debug!("retrying {what} ({attempt}/{retries}) in {delay:?}");
                tokio::time::sleep(delay).await;
            }

            match build().header("X-API-Key", self.api_key()).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    // 429 is worth waiting out; any other 4xx will fail the same way again
                    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        return Err(ProviderError::permanent(format!("PowerDNS {what} {status}: {body}")));
                    }
                    last_error = format!("{status}: {body}");
                }
                Err(e) => last_error = e.to_string(),
            }
            debug!("PowerDNS {what} failed: {last_error}");
        }

        Err(ProviderError::soft(format!("PowerDNS {what}: {last_error}")))
    }

    // ── zones ────────────────────────────────────────────────────────────────

    /// List all zones (stub objects only).
    pub async fn list_zones(&self) -> Result<Vec<ZoneStub>, ProviderError> {
        let url = format!("{}/zones", self.base());
        let resp = self.send("GET /zones", || self.http.get(&url)).await?;
        resp.json()
            .await
            .map_err(|e| ProviderError::soft(format!("decoding zone list: {e}")))
    }

    /// Fetch a zone with all its RRsets.
    pub async fn get_zone(&self, zone_id: &str) -> Result<ZoneDetail, ProviderError> {
        let url = format!("{}/zones/{}", self.base(), zone_id);
        let resp = self.send("GET /zones/:id", || self.http.get(&url)).await?;
        resp.json()
            .await
            .map_err(|e| ProviderError::soft(format!("decoding zone {zone_id}: {e}")))
    }

    /// Zones passing the configured filters, served from the cache while it
    /// is fresh. The lock is held across the refresh so concurrent callers
    /// never observe a half-populated list.
    pub async fn zones(&self) -> Result<Vec<Zone>, ProviderError> {
        let mut cache = self.zones.lock().await;
        if !cache.expired() {
            debug!("using {} cached PowerDNS zone(s)", cache.get().len());
            return Ok(cache.get().clone());
        }

        let zones: Vec<Zone> = self
            .list_zones()
            .await?
            .into_iter()
            .map(|stub| Zone::new(&stub.id, &stub.name, Visibility::Public))
            .filter(|zone| {
                let eligible = self.cfg.zone_filter.eligible(zone);
                if !eligible {
                    debug!("ignoring zone {} ({})", zone.name, zone.id);
                }
                eligible
            })
            .collect();

        debug!("found {} PowerDNS zone(s), updating zones cache", zones.len());
        cache.reset(zones.clone());
        Ok(zones)
    }

    // ── mutations ────────────────────────────────────────────────────────────

    async fn patch_zone(&self, zone_id: &str, rrsets: Vec<RrSet>) -> Result<(), ProviderError> {
        if rrsets.is_empty() {
            return Ok(());
        }
        let url = format!("{}/zones/{}", self.base(), zone_id);
        let payload = serde_json::json!({ "rrsets": rrsets });

        if self.cfg.dry_run {
            info!("dry-run: would PATCH zone {zone_id} with {} rrset(s)", rrsets.len());
            return Ok(());
        }
        self.send("PATCH /zones/:id", || self.http.patch(&url).json(&payload))
            .await
            .map(|_| ())
            .inspect_err(|e| error!("PowerDNS PATCH {zone_id}: {e}"))
    }

    async fn apply_zone(&self, zone_id: &str, zone_name: &str, changes: Changes) -> Result<(), ProviderError> {
        let mut deletes = Vec::new();
        let mut replaces = Vec::new();

        for ep in &changes.delete {
            info!("DELETE {} {} from {zone_id}", ep.record_type, ep.dns_name);
            deletes.push(build_rrset(ep, zone_name, self.cfg.default_ttl, ChangeType::Delete));
        }
        // PATCH replaces whole RRsets, so the old side of an update needs
        // no call of its own.
        for u in &changes.update {
            debug!("UPDATE-OLD (ignored) {}", u.old);
            info!("UPDATE {} {} in {zone_id}", u.new.record_type, u.new.dns_name);
            replaces.push(build_rrset(&u.new, zone_name, self.cfg.default_ttl, ChangeType::Replace));
        }
        for ep in &changes.create {
            info!("CREATE {} {} in {zone_id}", ep.record_type, ep.dns_name);
            replaces.push(build_rrset(ep, zone_name, self.cfg.default_ttl, ChangeType::Replace));
        }

        // Deletes go first: a name switching from A to CNAME must be free
        // before the CNAME lands.
        self.patch_zone(zone_id, deletes).await?;
        self.patch_zone(zone_id, replaces).await
    }
}

#[async_trait]
impl Provider for PdnsProvider {
    /// Return all endpoints from all eligible zones.
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        let zones = self.zones().await?;
        let mut endpoints = Vec::new();

        for zone in zones {
            let detail = self.get_zone(&zone.id).await?;
            for rrset in detail.rrsets {
                if let Some(ep) = rrset_to_endpoint(rrset) {
                    if self.cfg.zone_filter.domains.matches(&ep.dns_name) {
                        endpoints.push(ep);
                    }
                }
            }
        }

        debug!("fetched {} endpoint(s) from PowerDNS", endpoints.len());
        Ok(endpoints)
    }

    async fn apply_changes(&self, changes: &Changes) -> Result<(), ProviderError> {
        let started = Instant::now();
        let zones = self.zones().await?;
        let mapper: ZoneIdName = zones.iter().collect();

        for batch in changes.clone().batches(self.cfg.batch_change_size) {
            for (zone_id, zone_changes) in group_by_zone(&mapper, batch) {
                let zone_name = zones
                    .iter()
                    .find(|z| z.id == zone_id)
                    .map(|z| normalize_name(&z.name))
                    .unwrap_or_default();
                self.apply_zone(&zone_id, &zone_name, zone_changes).await?;
            }
        }

        info!("changes pushed out to PowerDNS in {:?}", started.elapsed());
        Ok(())
    }

    /// HTTPS records take their value from the providerSpecific override
    /// when present, and every HTTPS value gets a SvcPriority.
    async fn adjust_endpoints(&self, mut endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>, ProviderError> {
        for ep in endpoints.iter_mut().filter(|ep| ep.record_type == RecordType::Https) {
            if let Some(value) = ep.provider_specific(HTTPS_TARGET_PROPERTY).map(str::to_string) {
                let target = with_svc_priority(&value, &ep.dns_name);
                info!("HTTPS {} → target from '{HTTPS_TARGET_PROPERTY}': {target}", ep.dns_name);
                ep.targets = vec![target];
                continue;
            }
            let targets = ep.targets.iter().map(|t| with_svc_priority(t, &ep.dns_name)).collect();
            ep.targets = targets;
            debug!("HTTPS {} → normalised targets: {:?}", ep.dns_name, ep.targets);
        }
        Ok(valid_endpoints(endpoints))
    }

    fn domain_filter(&self) -> DomainFilter {
        self.cfg.zone_filter.domains.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn rrset_to_endpoint(rrset: RrSet) -> Option<Endpoint> {
    if rrset.rrtype == "SOA" {
        return None;
    }
    // If a record is "disabled", it's not supposed to be "visible"
    let record_type = match rrset.rrtype.as_str() {
        "ALIAS" => RecordType::Cname,
        other => RecordType::from(other),
    };
    let targets: Vec<String> = rrset
        .records
        .iter()
        .filter(|r| !r.disabled)
        .map(|r| denormalise_target(&record_type, &r.content))
        .collect();
    if targets.is_empty() {
        return None;
    }
    let mut ep = Endpoint::new(rrset.name.trim_end_matches('.'), record_type, targets);
    ep.record_ttl = Ttl(rrset.ttl.unwrap_or_default());
    Some(ep)
}

/// Normalise a record's content value for PowerDNS wire format.
///
/// PowerDNS requires a trailing dot on every value that is a DNS name:
///   CNAME  lb.domain.com   → lb.domain.com.
///   MX     10 mail.domain  → 10 mail.domain.
///   SRV    0 5 443 svc     → 0 5 443 svc.
///
/// A/AAAA records contain IP addresses – no dot needed.
/// TXT records must be quoted strings.
fn normalise_target(record_type: &RecordType, target: &str) -> String {
    match record_type {
        RecordType::Cname | RecordType::Ns | RecordType::Ptr => ensure_trailing_dot(target),
        RecordType::Mx | RecordType::Srv => match target.rsplit_once(' ') {
            Some((head, host)) => format!("{head} {}", ensure_trailing_dot(host)),
            None => ensure_trailing_dot(target),
        },
        RecordType::Txt => {
            if target.len() >= 2 && target.starts_with('"') && target.ends_with('"') {
                target.to_string()
            } else {
                format!("\"{}\"", target.replace('"', "\\\""))
            }
        }
        _ => target.to_string(),
    }
}

/// Inverse of [`normalise_target`] for name-valued records: endpoints carry
/// host names without the trailing dot, whatever PowerDNS stores.
fn denormalise_target(record_type: &RecordType, content: &str) -> String {
    match record_type {
        RecordType::Cname | RecordType::Ns | RecordType::Ptr => content.trim_end_matches('.').to_string(),
        RecordType::Mx | RecordType::Srv => match content.rsplit_once(' ') {
            Some((head, host)) => format!("{head} {}", host.trim_end_matches('.')),
            None => content.trim_end_matches('.').to_string(),
        },
        _ => content.to_string(),
    }
}

/// Ensure an HTTPS value starts with a SvcPriority.
///
///   "1 . alpn=h2,h3"   – already fully formed
///   ". alpn=h2,h3"     – missing priority → prepend "1"
///   "alpn=h2,h3"       – missing priority + target → prepend "1 ."
fn with_svc_priority(value: &str, dns_name: &str) -> String {
    let trimmed = value.trim();
    let first = trimmed.split_whitespace().next().unwrap_or("");
    if first.parse::<u16>().is_ok() {
        return trimmed.to_string();
    }
    if first.contains('=') {
        warn!("HTTPS {dns_name} value '{value}' has no target; wrapping as '1 . {trimmed}'");
        return format!("1 . {trimmed}");
    }
    warn!("HTTPS {dns_name} value '{value}' missing SvcPriority; prepending '1'");
    format!("1 {trimmed}")
}

fn build_rrset(ep: &Endpoint, zone_name: &str, default_ttl: u32, changetype: ChangeType) -> RrSet {
    let name = ensure_trailing_dot(&ep.dns_name);

    let mut rrtype = ep.record_type.to_string();
    if ep.record_type == RecordType::Cname && normalize_name(&ep.dns_name) == zone_name {
        debug!("converting apex record {name} from CNAME to ALIAS");
        rrtype = "ALIAS".to_string();
    }

    let records = ep
        .targets
        .iter()
        .map(|t| Record {
            content: normalise_target(&ep.record_type, t),
            disabled: false,
        })
        .collect();

    let ttl = match changetype {
        ChangeType::Replace => Some(ep.record_ttl.or(default_ttl)),
        ChangeType::Delete => None,
    };

    RrSet {
        name,
        rrtype,
        ttl,
        records,
        changetype: Some(changetype.as_str().to_string()),
    }
}
