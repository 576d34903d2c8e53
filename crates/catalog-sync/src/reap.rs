//! Removal of registry entries whose domain is no longer live.

use std::collections::{BTreeMap, HashSet};

use catalog_registry::RegisteredService;
use catalog_types::ServiceDomain;

use crate::ops::RegistryOp;

/// What a successful reap pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub reaped: usize,
    pub retained: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ReapPlan {
    /// Doomed entries, grouped by domain.
    pub by_domain: BTreeMap<ServiceDomain, Vec<RegistryOp>>,
    pub retained: usize,
}

impl ReapPlan {
    pub fn into_ops(self) -> Vec<RegistryOp> {
        self.by_domain.into_values().flatten().collect()
    }
}

/// Everything observed outside `live` is doomed. Membership is exact:
/// `exec-9` being live keeps neither `exec-99` nor `exec-9-1`.
pub(crate) fn plan_reap(observed: &[RegisteredService], live: &[ServiceDomain]) -> ReapPlan {
    let live: HashSet<&ServiceDomain> = live.iter().collect();
    let mut plan = ReapPlan::default();
    for entry in observed {
        if live.contains(&entry.domain) {
            plan.retained += 1;
            continue;
        }
        plan.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .push(RegistryOp::Deregister {
                domain: entry.domain.clone(),
                key: entry.key.clone(),
                name: entry.name.clone(),
            });
    }
    plan
}
