//! Diff of desired state against the registry's observed entries.

use std::collections::HashMap;

use catalog_registry::RegisteredService;
use catalog_types::{ServiceDomain, ServiceKey};

use crate::ops::RegistryOp;
use crate::state::Snapshot;

/// What a successful sync pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub registered: usize,
    pub deregistered: usize,
    pub unchanged: usize,
    /// Registrations held back because the registry rejected this exact
    /// definition before.
    pub skipped_rejected: usize,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        self.registered > 0 || self.deregistered > 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct SyncPlan {
    pub ops: Vec<RegistryOp>,
    pub unchanged: usize,
    pub skipped_rejected: usize,
}

/// Plan the registrations that make `observed` match `desired`.
///
/// Only domains present in `desired` are considered for removal; entries of
/// any other domain belong to the reaper.
pub(crate) fn plan_sync(desired: &Snapshot, observed: &[RegisteredService]) -> SyncPlan {
    let observed_by_owner: HashMap<(&ServiceDomain, &ServiceKey), &RegisteredService> = observed
        .iter()
        .map(|entry| ((&entry.domain, &entry.key), entry))
        .collect();

    let mut plan = SyncPlan::default();
    for (domain, services) in &desired.domains {
        for (key, service) in services {
            let fingerprint = service.fingerprint();
            match observed_by_owner.get(&(domain, key)) {
                Some(entry) if entry.fingerprint == fingerprint => plan.unchanged += 1,
                _ if desired.is_rejected(domain, key, &fingerprint) => plan.skipped_rejected += 1,
                _ => plan.ops.push(RegistryOp::Register {
                    domain: domain.clone(),
                    key: key.clone(),
                    service: service.clone(),
                }),
            }
        }
    }

    for entry in observed {
        let Some(services) = desired.domains.get(&entry.domain) else {
            continue;
        };
        if !services.contains_key(&entry.key) {
            plan.ops.push(RegistryOp::Deregister {
                domain: entry.domain.clone(),
                key: entry.key.clone(),
                name: entry.name.clone(),
            });
        }
    }
    plan
}
