//! Reconciliation planner.
//!
//! [`Plan::calculate`] diffs the records a provider currently publishes
//! against the records the cluster wants and produces the minimal
//! [`Changes`] needed to converge. It performs no I/O: running it again on
//! the same input yields the same output, and running it on converged input
//! yields nothing, which is what makes an interrupted apply safe to retry.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    mem,
    str::FromStr,
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    domain_filter::DomainFilter,
    endpoint::{merge_endpoints, normalize_name, Endpoint, EndpointKey, RecordType, OWNER_LABEL},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Providers must hand back one endpoint per key.
    #[error("current state contains {0} more than once")]
    DuplicateCurrent(EndpointKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown policy '{0}', expected one of sync, upsert-only, create-only")]
pub struct UnknownPolicy(pub String);

// ─────────────────────────────────────────────────────────────────────────────
// Changes
// ─────────────────────────────────────────────────────────────────────────────

/// An in-place replacement of `old` by `new`; both share one key.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub old: Endpoint,
    pub new: Endpoint,
}

/// The output of a plan, handed to exactly one provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    pub create: Vec<Endpoint>,
    pub update: Vec<Update>,
    pub delete: Vec<Endpoint>,
}

/// One provider operation, borrowed from a [`Changes`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation<'a> {
    Delete(&'a Endpoint),
    Update(&'a Update),
    Create(&'a Endpoint),
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Number of provider operations; an update is a deletion plus an addition.
    pub fn len(&self) -> usize {
        self.create.len() + self.delete.len() + 2 * self.update.len()
    }

    pub fn update_old(&self) -> impl Iterator<Item = &Endpoint> {
        self.update.iter().map(|u| &u.old)
    }

    pub fn update_new(&self) -> impl Iterator<Item = &Endpoint> {
        self.update.iter().map(|u| &u.new)
    }

    /// Operations in application order: deletes, then updates, then creates.
    /// A delete of a name therefore always precedes a create of that name.
    pub fn ordered(&self) -> Vec<Operation<'_>> {
        self.delete
            .iter()
            .map(Operation::Delete)
            .chain(self.update.iter().map(Operation::Update))
            .chain(self.create.iter().map(Operation::Create))
            .collect()
    }

    fn extend(&mut self, other: Changes) {
        self.create.extend(other.create);
        self.update.extend(other.update);
        self.delete.extend(other.delete);
    }

    /// Split into sub-batches of at most `max_ops` operations.
    ///
    /// All operations touching one DNS name travel in the same batch so a
    /// delete and a create of that name are never separated. A single name
    /// needing more than `max_ops` operations cannot be applied safely and
    /// is skipped. `max_ops == 0` disables splitting.
    pub fn batches(self, max_ops: usize) -> Vec<Changes> {
        if self.is_empty() {
            return Vec::new();
        }
        if max_ops == 0 || self.len() <= max_ops {
            return vec![self];
        }

        let mut groups: BTreeMap<String, Changes> = BTreeMap::new();
        for ep in self.delete {
            groups.entry(normalize_name(&ep.dns_name)).or_default().delete.push(ep);
        }
        for u in self.update {
            groups.entry(normalize_name(&u.new.dns_name)).or_default().update.push(u);
        }
        for ep in self.create {
            groups.entry(normalize_name(&ep.dns_name)).or_default().create.push(ep);
        }

        let mut batches = Vec::new();
        let mut batch = Changes::default();
        for (name, group) in groups {
            if group.len() > max_ops {
                error!(
                    "changes for {name} need {} operations, more than the batch limit of {max_ops}; skipping",
                    group.len()
                );
                continue;
            }
            if batch.len() + group.len() > max_ops {
                batches.push(mem::take(&mut batch));
            }
            batch.extend(group);
        }
        if !batch.is_empty() {
            batches.push(batch);
        }
        batches
    }
}

impl fmt::Display for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} create, {} update, {} delete",
            self.create.len(),
            self.update.len(),
            self.delete.len()
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Which kinds of change the controller is allowed to make.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Policy {
    #[default]
    Sync,
    UpsertOnly,
    CreateOnly,
}

impl Policy {
    pub fn apply(self, mut changes: Changes) -> Changes {
        match self {
            Policy::Sync => {}
            Policy::UpsertOnly => changes.delete.clear(),
            Policy::CreateOnly => {
                changes.update.clear();
                changes.delete.clear();
            }
        }
        changes
    }
}

impl FromStr for Policy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "sync" => Ok(Policy::Sync),
            "upsert-only" => Ok(Policy::UpsertOnly),
            "create-only" => Ok(Policy::CreateOnly),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plan
// ─────────────────────────────────────────────────────────────────────────────

/// Record types managed when nothing else is configured.
pub const DEFAULT_MANAGED_TYPES: &[RecordType] = &[RecordType::A, RecordType::Aaaa, RecordType::Cname];

#[derive(Debug, Clone)]
pub struct Plan {
    /// Records as published by the provider, ownership already resolved.
    pub current: Vec<Endpoint>,
    /// Records computed from cluster sources.
    pub desired: Vec<Endpoint>,
    /// Owner identifier of this controller. Empty means every current
    /// record without an owner label is ours.
    pub owner_id: String,
    pub domain_filter: DomainFilter,
    pub managed_types: Vec<RecordType>,
    pub policy: Policy,
    /// Take over records that carry no ownership marker at all.
    pub adopt_unowned: bool,
}

enum Ownership<'a> {
    Owned,
    Unowned,
    Foreign(&'a str),
}

impl Plan {
    pub fn new(current: Vec<Endpoint>, desired: Vec<Endpoint>) -> Self {
        Self {
            current,
            desired,
            owner_id: String::new(),
            domain_filter: DomainFilter::default(),
            managed_types: DEFAULT_MANAGED_TYPES.to_vec(),
            policy: Policy::default(),
            adopt_unowned: false,
        }
    }

    pub fn owner_id(mut self, owner_id: &str) -> Self {
        self.owner_id = owner_id.to_string();
        self
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

    fn is_managed(&self, ep: &Endpoint) -> bool {
        self.managed_types.contains(&ep.record_type) && self.domain_filter.matches(&ep.dns_name)
    }

    fn ownership<'a>(&self, ep: &'a Endpoint) -> Ownership<'a> {
        match ep.owner() {
            owner if owner == self.owner_id => Ownership::Owned,
            "" => Ownership::Unowned,
            other => Ownership::Foreign(other),
        }
    }

    /// Whether this controller may modify or remove `ep`.
    fn may_modify(&self, ep: &Endpoint) -> bool {
        match self.ownership(ep) {
            Ownership::Owned => true,
            Ownership::Unowned => self.adopt_unowned,
            Ownership::Foreign(_) => false,
        }
    }

    /// Compute the changes that turn `current` into `desired`.
    pub fn calculate(&self) -> Result<Changes, PlanError> {
        let mut current: BTreeMap<EndpointKey, &Endpoint> = BTreeMap::new();
        for ep in self.current.iter().filter(|ep| self.is_managed(ep)) {
            let key = ep.key();
            if current.insert(key.clone(), ep).is_some() {
                return Err(PlanError::DuplicateCurrent(key));
            }
        }

        // Keys whose desired form was invalid: leave the published record alone.
        let mut protected: HashSet<EndpointKey> = HashSet::new();
        let mut desired: BTreeMap<EndpointKey, Endpoint> = BTreeMap::new();
        let wanted = self.desired.iter().filter(|ep| self.is_managed(ep)).cloned().collect();
        for ep in merge_endpoints(wanted) {
            let key = ep.key();
            if let Err(e) = ep.validate() {
                warn!("ignoring desired endpoint: {e}");
                protected.insert(key);
                continue;
            }
            desired.insert(key, ep);
        }

        let mut changes = Changes::default();

        for (key, want) in &desired {
            let Some(have) = current.get(key) else {
                changes.create.push(self.stamped(want.clone()));
                continue;
            };
            match self.ownership(have) {
                Ownership::Foreign(owner) => {
                    info!("skipping {key}: owned by '{owner}'");
                }
                Ownership::Unowned if !self.adopt_unowned => {
                    info!("skipping {key}: record exists without an ownership marker");
                }
                _ => {
                    if self.needs_update(have, want) {
                        changes.update.push(Update {
                            old: (*have).clone(),
                            new: self.updated(have, want),
                        });
                    }
                }
            }
        }

        for (key, have) in &current {
            if desired.contains_key(key) {
                continue;
            }
            if protected.contains(key) {
                debug!("keeping {key}: desired form is invalid");
                continue;
            }
            if self.may_modify(have) {
                changes.delete.push((*have).clone());
            } else {
                debug!("not deleting {key}: not owned by '{}'", self.owner_id);
            }
        }

        let mut changes = self.policy.apply(changes);
        self.drop_conflicting_creates(&mut changes);
        debug!("planned {changes}");
        Ok(changes)
    }

    /// A create may not land on a name that holds another owner's record,
    /// and a CNAME may not share its name with any record that outlives
    /// this plan.
    fn drop_conflicting_creates(&self, changes: &mut Changes) {
        let deleted: HashSet<EndpointKey> = changes.delete.iter().map(Endpoint::key).collect();
        let surviving: Vec<&Endpoint> = self
            .current
            .iter()
            .filter(|ep| self.domain_filter.matches(&ep.dns_name) && !deleted.contains(&ep.key()))
            .collect();

        changes.create.retain(|ep| {
            let name = normalize_name(&ep.dns_name);
            let at_name: Vec<&Endpoint> = surviving
                .iter()
                .copied()
                .filter(|have| normalize_name(&have.dns_name) == name)
                .collect();

            let foreign = at_name.iter().find_map(|have| match self.ownership(have) {
                Ownership::Foreign(owner) => Some(owner),
                _ => None,
            });
            if let Some(owner) = foreign {
                info!("skipping create of {}: {name} is owned by '{owner}'", ep.key());
                return false;
            }

            let is_cname = ep.record_type == RecordType::Cname;
            if let Some(have) = at_name.iter().find(|have| (have.record_type == RecordType::Cname) != is_cname) {
                info!("skipping create of {}: conflicts with existing {}", ep.key(), have.key());
                return false;
            }
            true
        });
    }

    fn needs_update(&self, have: &Endpoint, want: &Endpoint) -> bool {
        if !have.same_targets(want) {
            return true;
        }
        if want.record_ttl.is_configured() && want.record_ttl != have.record_ttl {
            return true;
        }
        if !have.same_provider_specific(want) {
            return true;
        }
        // Adopting an unowned record is an update even when the data matches.
        !self.owner_id.is_empty() && have.owner() != self.owner_id
    }

    /// The new side of an update: desired data on top of a copy of the
    /// current labels, so registry bookkeeping survives.
    fn updated(&self, have: &Endpoint, want: &Endpoint) -> Endpoint {
        let mut new = want.clone();
        let mut labels = have.labels.clone();
        labels.extend(want.labels.clone());
        new.labels = labels;
        self.stamped(new)
    }

    fn stamped(&self, mut ep: Endpoint) -> Endpoint {
        ep.targets = ep.sorted_targets();
        if !self.owner_id.is_empty() {
            ep.labels.insert(OWNER_LABEL.to_string(), self.owner_id.clone());
        }
        ep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Ttl, RESOURCE_LABEL};

    const OWNER: &str = "owner-a";

    fn a(name: &str, targets: &[&str]) -> Endpoint {
        Endpoint::new(name, RecordType::A, targets.iter().copied())
    }

    fn owned(ep: Endpoint) -> Endpoint {
        ep.with_label(OWNER_LABEL, OWNER)
    }

    fn plan(current: Vec<Endpoint>, desired: Vec<Endpoint>) -> Changes {
        Plan::new(current, desired).owner_id(OWNER).calculate().unwrap()
    }

    #[test]
    fn identical_state_yields_no_changes() {
        let current = vec![
            owned(a("x.com", &["1.1.1.1"]).with_ttl(300)),
            owned(Endpoint::new("y.com", RecordType::Cname, ["lb.example.net"])),
        ];
        let desired = vec![
            a("x.com", &["1.1.1.1"]).with_ttl(300),
            Endpoint::new("y.com", RecordType::Cname, ["lb.example.net"]),
        ];
        assert!(plan(current, desired).is_empty());
    }

    #[test]
    fn replanning_after_apply_is_empty() {
        let desired = vec![a("x.com", &["2.2.2.2", "1.1.1.1"])];
        let first = plan(vec![], desired.clone());
        assert_eq!(first.create.len(), 1);

        let published = first.create.clone();
        assert!(plan(published, desired).is_empty());
    }

    #[test]
    fn target_order_does_not_cause_updates() {
        let current = vec![owned(a("x.com", &["2.2.2.2", "1.1.1.1"]))];
        let desired = vec![a("x.com", &["1.1.1.1", "2.2.2.2"])];
        assert!(plan(current, desired).is_empty());
    }

    #[test]
    fn desired_duplicates_are_merged_into_one_create() {
        let desired = vec![
            a("a.example.com", &["1.1.1.1"]).with_ttl(60),
            a("a.example.com", &["2.2.2.2"]).with_ttl(600),
        ];
        let changes = plan(vec![], desired);

        assert_eq!(changes.create.len(), 1);
        let created = &changes.create[0];
        assert_eq!(created.targets, vec!["1.1.1.1", "2.2.2.2"]);
        assert_eq!(created.record_ttl, Ttl(60));
        assert_eq!(created.owner(), OWNER);
        assert!(changes.update.is_empty() && changes.delete.is_empty());
    }

    #[test]
    fn ttl_change_is_an_update() {
        let current = vec![owned(a("x.com", &["1.1.1.1"]).with_ttl(300))];
        let desired = vec![a("x.com", &["1.1.1.1"]).with_ttl(600)];
        let changes = plan(current, desired);

        assert_eq!(changes.update.len(), 1);
        assert_eq!(changes.update[0].old.record_ttl, Ttl(300));
        assert_eq!(changes.update[0].new.record_ttl, Ttl(600));
        assert!(changes.create.is_empty() && changes.delete.is_empty());
    }

    #[test]
    fn unconfigured_desired_ttl_keeps_published_ttl() {
        let current = vec![owned(a("x.com", &["1.1.1.1"]).with_ttl(300))];
        let desired = vec![a("x.com", &["1.1.1.1"])];
        assert!(plan(current, desired).is_empty());
    }

    #[test]
    fn provider_specific_change_is_an_update() {
        let current = vec![owned(a("x.com", &["1.1.1.1"]))];
        let desired = vec![a("x.com", &["1.1.1.1"]).with_provider_specific("alias", "true")];
        assert_eq!(plan(current, desired).update.len(), 1);
    }

    #[test]
    fn update_copies_current_labels() {
        let current = vec![owned(a("x.com", &["1.1.1.1"])).with_label("prefix", "abc")];
        let desired = vec![a("x.com", &["9.9.9.9"]).with_label(RESOURCE_LABEL, "ingress/default/web")];
        let changes = plan(current, desired);

        let new = &changes.update[0].new;
        assert_eq!(new.labels.get("prefix").map(String::as_str), Some("abc"));
        assert_eq!(new.labels.get(RESOURCE_LABEL).map(String::as_str), Some("ingress/default/web"));
        assert_eq!(new.owner(), OWNER);
        assert!(changes.update[0].old.labels.get(RESOURCE_LABEL).is_none());
    }

    #[test]
    fn absent_from_desired_is_deleted() {
        let current = vec![owned(a("gone.com", &["1.1.1.1"])), owned(a("kept.com", &["2.2.2.2"]))];
        let desired = vec![a("kept.com", &["2.2.2.2"])];
        let changes = plan(current, desired);

        assert_eq!(changes.delete.len(), 1);
        assert_eq!(changes.delete[0].dns_name, "gone.com");
        assert!(changes.create.is_empty() && changes.update.is_empty());
    }

    #[test]
    fn foreign_records_are_never_touched() {
        let foreign = a("x.com", &["1.1.1.1"]).with_label(OWNER_LABEL, "owner-b");
        let changes = plan(vec![foreign.clone()], vec![]);
        assert!(changes.is_empty());

        let changes = plan(vec![foreign], vec![a("x.com", &["9.9.9.9"])]);
        assert!(changes.is_empty(), "must neither update nor re-create: {changes}");
    }

    #[test]
    fn unowned_records_are_left_alone_by_default() {
        let unowned = a("x.com", &["1.1.1.1"]);
        assert!(plan(vec![unowned.clone()], vec![]).is_empty());
        assert!(plan(vec![unowned], vec![a("x.com", &["9.9.9.9"])]).is_empty());
    }

    #[test]
    fn adopting_unowned_records_claims_them() {
        let unowned = a("x.com", &["1.1.1.1"]);
        let changes = Plan::new(vec![unowned.clone()], vec![a("x.com", &["1.1.1.1"])])
            .owner_id(OWNER)
            .adopt_unowned(true)
            .calculate()
            .unwrap();
        assert_eq!(changes.update.len(), 1);
        assert_eq!(changes.update[0].new.owner(), OWNER);

        let changes = Plan::new(vec![unowned], vec![])
            .owner_id(OWNER)
            .adopt_unowned(true)
            .calculate()
            .unwrap();
        assert_eq!(changes.delete.len(), 1);
    }

    #[test]
    fn empty_owner_id_owns_unlabelled_records() {
        let changes = Plan::new(vec![a("x.com", &["1.1.1.1"])], vec![]).calculate().unwrap();
        assert_eq!(changes.delete.len(), 1);
    }

    #[test]
    fn invalid_desired_endpoint_is_dropped_but_protects_current() {
        let current = vec![owned(Endpoint::new("x.com", RecordType::Cname, ["lb.example.net"]))];
        let desired = vec![
            Endpoint::new("x.com", RecordType::Cname, ["a.example.net"]),
            Endpoint::new("x.com", RecordType::Cname, ["b.example.net"]),
            Endpoint::new("new.com", RecordType::A, ["not-an-ip"]),
        ];
        let changes = plan(current, desired);
        assert!(changes.is_empty(), "got {changes}");
    }

    #[test]
    fn record_type_switch_deletes_before_creating() {
        let current = vec![owned(a("x.com", &["1.1.1.1"]))];
        let desired = vec![Endpoint::new("x.com", RecordType::Cname, ["lb.example.net"])];
        let changes = plan(current, desired);

        let ops = changes.ordered();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[0], Operation::Delete(ep) if ep.record_type == RecordType::A));
        assert!(matches!(ops[1], Operation::Create(ep) if ep.record_type == RecordType::Cname));
    }

    #[test]
    fn foreign_record_blocks_other_types_at_its_name() {
        let foreign = a("x.com", &["1.1.1.1"]).with_label(OWNER_LABEL, "owner-b");
        let desired = vec![
            Endpoint::new("x.com", RecordType::Cname, ["lb.example.net"]),
            Endpoint::new("x.com", RecordType::Aaaa, ["2001:db8::1"]),
        ];
        let changes = plan(vec![foreign], desired);
        assert!(changes.is_empty(), "got {changes}");
    }

    #[test]
    fn cname_is_not_created_next_to_surviving_records() {
        // MX is unmanaged here, so it stays and the CNAME would clash with it
        let current = vec![owned(Endpoint::new("x.com", RecordType::Mx, ["10 mail.x.com"]))];
        let desired = vec![Endpoint::new("x.com", RecordType::Cname, ["lb.example.net"])];
        assert!(plan(current, desired).is_empty());

        let current = vec![owned(Endpoint::new("y.com", RecordType::Cname, ["lb.example.net"]))];
        let desired = vec![
            Endpoint::new("y.com", RecordType::Cname, ["lb.example.net"]),
            a("y.com", &["1.1.1.1"]),
        ];
        assert!(plan(current, desired).is_empty());
    }

    #[test]
    fn kept_record_blocks_type_switch_under_upsert_only() {
        let current = vec![owned(a("x.com", &["1.1.1.1"]))];
        let desired = vec![Endpoint::new("x.com", RecordType::Cname, ["lb.example.net"])];
        let changes = Plan::new(current, desired)
            .owner_id(OWNER)
            .policy(Policy::UpsertOnly)
            .calculate()
            .unwrap();
        assert!(changes.is_empty(), "got {changes}");
    }

    #[test]
    fn set_identifier_separates_endpoints() {
        let current = vec![owned(a("x.com", &["1.1.1.1"]).with_set_identifier("eu"))];
        let desired = vec![
            a("x.com", &["1.1.1.1"]).with_set_identifier("eu"),
            a("x.com", &["2.2.2.2"]).with_set_identifier("us"),
        ];
        let changes = plan(current, desired);
        assert_eq!(changes.create.len(), 1);
        assert_eq!(changes.create[0].set_identifier, "us");
        assert!(changes.update.is_empty());
    }

    #[test]
    fn unmanaged_types_and_filtered_names_are_ignored() {
        let current = vec![
            owned(Endpoint::new("x.com", RecordType::Mx, ["10 mail.x.com"])),
            owned(a("other.org", &["1.1.1.1"])),
        ];
        let desired = vec![Endpoint::new("x.com", RecordType::Txt, ["hello"])];
        let changes = Plan::new(current, desired)
            .owner_id(OWNER)
            .domain_filter(DomainFilter::new(["x.com"]))
            .calculate()
            .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn duplicate_current_keys_fail_loudly() {
        let current = vec![owned(a("x.com", &["1.1.1.1"])), owned(a("X.com.", &["2.2.2.2"]))];
        let err = Plan::new(current, vec![]).calculate().unwrap_err();
        assert!(matches!(err, PlanError::DuplicateCurrent(_)));
    }

    #[test]
    fn policies_restrict_changes() {
        let current = vec![owned(a("old.com", &["1.1.1.1"])), owned(a("upd.com", &["1.1.1.1"]))];
        let desired = vec![a("upd.com", &["2.2.2.2"]), a("new.com", &["3.3.3.3"])];

        let sync = plan(current.clone(), desired.clone());
        assert_eq!((sync.create.len(), sync.update.len(), sync.delete.len()), (1, 1, 1));

        let upsert = Policy::UpsertOnly.apply(sync.clone());
        assert_eq!((upsert.create.len(), upsert.update.len(), upsert.delete.len()), (1, 1, 0));

        let create = Policy::CreateOnly.apply(sync);
        assert_eq!((create.create.len(), create.update.len(), create.delete.len()), (1, 0, 0));

        assert_eq!("upsert-only".parse::<Policy>(), Ok(Policy::UpsertOnly));
        assert!("everything".parse::<Policy>().is_err());
    }

    #[test]
    fn output_is_sorted_by_key() {
        let desired = vec![a("b.com", &["1.1.1.1"]), a("a.com", &["1.1.1.1"]), a("c.com", &["1.1.1.1"])];
        let names: Vec<_> = plan(vec![], desired).create.into_iter().map(|e| e.dns_name).collect();
        assert_eq!(names, vec!["a.com", "b.com", "c.com"]);
    }

    #[test]
    fn small_changes_are_a_single_batch() {
        let changes = plan(vec![], vec![a("a.com", &["1.1.1.1"]), a("b.com", &["1.1.1.1"])]);
        assert_eq!(changes.clone().batches(10), vec![changes.clone()]);
        assert_eq!(changes.clone().batches(0), vec![changes]);
        assert!(Changes::default().batches(5).is_empty());
    }

    #[test]
    fn batches_respect_limit_and_keep_names_together() {
        let mut changes = Changes::default();
        for i in (1..=50).step_by(2) {
            let name = format!("host-{i}.example.org");
            changes.create.push(Endpoint::new(&name, RecordType::Cname, ["x.example.org"]));
            changes.delete.push(a(&name, &["1.1.1.1"]));
        }
        let total = changes.len();

        let batches = changes.batches(11);
        assert_eq!(batches.len(), 5);
        assert_eq!(batches.iter().map(Changes::len).sum::<usize>(), total);
        for batch in &batches {
            assert!(batch.len() <= 11);
            for created in &batch.create {
                assert!(batch.delete.iter().any(|d| d.dns_name == created.dns_name));
            }
        }
    }

    #[test]
    fn name_group_larger_than_limit_is_skipped() {
        let mut changes = Changes::default();
        changes.create.push(Endpoint::new("host-1.example.org", RecordType::Cname, ["x.example.org"]));
        changes.delete.push(a("host-1.example.org", &["1.1.1.1"]));
        assert!(changes.batches(1).is_empty());
    }
}
