//! Domain and zone filtering.
//!
//! All matching is suffix based on label boundaries: `example.com` covers
//! `example.com` and `foo.example.com`, never `fooexample.com`. Names are
//! compared lower-cased and without their trailing dot.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::Serialize;
use thiserror::Error;

use crate::endpoint::normalize_name;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unknown zone type filter '{0}', expected 'public' or 'private'")]
    UnknownZoneType(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain filter
// ─────────────────────────────────────────────────────────────────────────────

/// Include/exclude suffix patterns. Serialises as the webhook negotiation body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl DomainFilter {
    pub fn new<I, S>(include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_exclusions(include, Vec::<String>::new())
    }

    pub fn with_exclusions<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        E: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            include: normalize_filters(include),
            exclude: normalize_filters(exclude),
        }
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn is_configured(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty()
    }

    /// True when `name` is covered by the include list and not excluded.
    /// An unconfigured include list covers everything.
    pub fn matches(&self, name: &str) -> bool {
        let name = normalize_name(name);
        let included = self.include.is_empty() || self.include.iter().any(|f| suffix_match(f, &name));
        included && !self.exclude.iter().any(|f| suffix_match(f, &name))
    }

    /// True when some include filter lies inside the zone `name`, i.e. the
    /// zone may hold records the filter selects even though the zone apex
    /// itself is not selected.
    pub fn matches_parent(&self, name: &str) -> bool {
        let name = normalize_name(name);
        if self.exclude.iter().any(|f| suffix_match(f, &name)) {
            return false;
        }
        self.include
            .iter()
            .any(|f| suffix_match(&name, f.trim_start_matches('.')))
    }
}

fn normalize_filters<I, S>(filters: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    filters
        .into_iter()
        .map(|f| f.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
        .filter(|f| !f.is_empty() && f != ".")
        .collect()
}

/// Label-boundary suffix match. A filter with a leading dot only covers
/// strict subdomains.
fn suffix_match(filter: &str, name: &str) -> bool {
    if filter.starts_with('.') {
        return name.ends_with(filter);
    }
    name == filter
        || name
            .strip_suffix(filter)
            .is_some_and(|head| head.ends_with('.'))
}

// ─────────────────────────────────────────────────────────────────────────────
// Zones
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Private,
}

/// A provider-managed authoritative zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub visibility: Visibility,
}

impl Zone {
    pub fn new(id: &str, name: &str, visibility: Visibility) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            visibility,
        }
    }
}

/// Allow-list of opaque zone identifiers. Empty allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneIdFilter {
    ids: Vec<String>,
}

impl ZoneIdFilter {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ids: ids
                .into_iter()
                .map(|id| id.as_ref().trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        self.ids.is_empty() || self.ids.iter().any(|allowed| allowed == id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ZoneTypeFilter {
    #[default]
    Any,
    Public,
    Private,
}

impl ZoneTypeFilter {
    pub fn matches(self, visibility: Visibility) -> bool {
        match self {
            ZoneTypeFilter::Any => true,
            ZoneTypeFilter::Public => visibility == Visibility::Public,
            ZoneTypeFilter::Private => visibility == Visibility::Private,
        }
    }
}

impl FromStr for ZoneTypeFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(ZoneTypeFilter::Any),
            "public" => Ok(ZoneTypeFilter::Public),
            "private" => Ok(ZoneTypeFilter::Private),
            other => Err(FilterError::UnknownZoneType(other.to_string())),
        }
    }
}

impl fmt::Display for ZoneTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ZoneTypeFilter::Any => "any",
            ZoneTypeFilter::Public => "public",
            ZoneTypeFilter::Private => "private",
        })
    }
}

/// The three zone predicates, combined with AND semantics.
#[derive(Debug, Clone, Default)]
pub struct ZoneFilter {
    pub domains: DomainFilter,
    pub ids: ZoneIdFilter,
    pub zone_type: ZoneTypeFilter,
}

impl ZoneFilter {
    pub fn eligible(&self, zone: &Zone) -> bool {
        (self.domains.matches(&zone.name) || self.domains.matches_parent(&zone.name))
            && self.ids.matches(&zone.id)
            && self.zone_type.matches(zone.visibility)
    }
}

/// Zone id → zone name lookup used to route endpoints to their zone.
#[derive(Debug, Clone, Default)]
pub struct ZoneIdName(BTreeMap<String, String>);

impl ZoneIdName {
    pub fn add(&mut self, id: &str, name: &str) {
        self.0.insert(id.to_string(), normalize_name(name));
    }

    /// The most specific zone containing `name`, as `(id, zone name)`.
    pub fn find_zone(&self, name: &str) -> Option<(&str, &str)> {
        let name = normalize_name(name);
        self.0
            .iter()
            .filter(|(_, zone)| suffix_match(zone, &name))
            .max_by_key(|(_, zone)| zone.len())
            .map(|(id, zone)| (id.as_str(), zone.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a Zone> for ZoneIdName {
    fn from_iter<T: IntoIterator<Item = &'a Zone>>(zones: T) -> Self {
        let mut mapper = ZoneIdName::default();
        for zone in zones {
            mapper.add(&zone.id, &zone.name);
        }
        mapper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_filter_matches_everything() {
        let filter = DomainFilter::default();
        assert!(!filter.is_configured());
        assert!(filter.matches("anything.example.org"));
        assert!(filter.matches(""));
    }

    #[test]
    fn filter_respects_label_boundaries() {
        let filter = DomainFilter::new(["example.com"]);
        assert!(filter.matches("foo.example.com"));
        assert!(filter.matches("example.com"));
        assert!(filter.matches("Foo.Example.COM."));
        assert!(!filter.matches("fooexample.com"));
        assert!(!filter.matches("example.com.evil.org"));
    }

    #[test]
    fn leading_dot_filter_only_covers_subdomains() {
        let filter = DomainFilter::new([".example.com"]);
        assert!(filter.matches("foo.example.com"));
        assert!(!filter.matches("example.com"));
    }

    #[test]
    fn exclusions_win_over_inclusions() {
        let filter = DomainFilter::with_exclusions(["example.com"], ["internal.example.com"]);
        assert!(filter.matches("www.example.com"));
        assert!(!filter.matches("db.internal.example.com"));
        assert!(!filter.matches("internal.example.com"));
    }

    #[test]
    fn exclusion_only_filter_covers_the_rest() {
        let filter = DomainFilter::with_exclusions(Vec::<String>::new(), ["example.org"]);
        assert!(filter.is_configured());
        assert!(filter.matches("example.com"));
        assert!(!filter.matches("a.example.org"));
    }

    #[test]
    fn blank_filters_are_ignored() {
        let filter = DomainFilter::new(["", " ", "."]);
        assert!(!filter.is_configured());
    }

    #[test]
    fn parent_zone_of_filter_is_eligible() {
        let filter = DomainFilter::new(["sub.example.com"]);
        assert!(!filter.matches("example.com"));
        assert!(filter.matches_parent("example.com"));
        assert!(!filter.matches_parent("other.com"));
    }

    #[test]
    fn find_zone_prefers_longest_suffix() {
        let zones = [
            Zone::new("z1", "example.com", Visibility::Public),
            Zone::new("z2", "zone1.example.com.", Visibility::Public),
        ];
        let mapper: ZoneIdName = zones.iter().collect();

        assert_eq!(mapper.find_zone("foo.zone1.example.com"), Some(("z2", "zone1.example.com")));
        assert_eq!(mapper.find_zone("foo.example.com"), Some(("z1", "example.com")));
        assert_eq!(mapper.find_zone("zone1.example.com"), Some(("z2", "zone1.example.com")));
        assert_eq!(mapper.find_zone("foozone1.example.com"), Some(("z1", "example.com")));
        assert_eq!(mapper.find_zone("example.org"), None);
    }

    #[test]
    fn zone_type_filter_parses() {
        assert_eq!("".parse::<ZoneTypeFilter>(), Ok(ZoneTypeFilter::Any));
        assert_eq!("Public".parse::<ZoneTypeFilter>(), Ok(ZoneTypeFilter::Public));
        assert_eq!("private".parse::<ZoneTypeFilter>(), Ok(ZoneTypeFilter::Private));
        assert!("peering".parse::<ZoneTypeFilter>().is_err());
    }

    #[test]
    fn zone_filter_combines_predicates() {
        let public = Zone::new("10001", "cluster.local", Visibility::Public);
        let private = Zone::new("10002", "cluster.local", Visibility::Private);
        let other = Zone::new("10003", "svc.local", Visibility::Private);

        let by_id = ZoneFilter {
            domains: DomainFilter::new(["cluster.local"]),
            ids: ZoneIdFilter::new(["10002"]),
            zone_type: ZoneTypeFilter::Any,
        };
        assert!(!by_id.eligible(&public));
        assert!(by_id.eligible(&private));
        assert!(!by_id.eligible(&other));

        let by_type = ZoneFilter {
            domains: DomainFilter::new(["cluster.local"]),
            ids: ZoneIdFilter::new([""]),
            zone_type: ZoneTypeFilter::Public,
        };
        assert!(by_type.eligible(&public));
        assert!(!by_type.eligible(&private));
    }
}
