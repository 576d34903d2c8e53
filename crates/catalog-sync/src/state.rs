//! Desired-state table: `domain -> (key -> service)`.
//!
//! Every access goes through one mutex held only for map work, never across
//! registry I/O. Readers get owned copies.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use catalog_types::{Fingerprint, Service, ServiceDomain, ServiceKey};

pub(crate) type DomainServices = BTreeMap<ServiceKey, Service>;
type OwnedKey = (ServiceDomain, ServiceKey);

#[derive(Debug, Default)]
struct DesiredState {
    domains: BTreeMap<ServiceDomain, DomainServices>,
    dirty: bool,
    /// Fingerprints the registry refused, per registration.
    rejected: HashMap<OwnedKey, Fingerprint>,
}

/// Copy of the desired-state table taken under the lock.
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    pub domains: BTreeMap<ServiceDomain, DomainServices>,
    pub rejected: HashMap<OwnedKey, Fingerprint>,
}

impl Snapshot {
    pub fn is_rejected(&self, domain: &ServiceDomain, key: &ServiceKey, fp: &Fingerprint) -> bool {
        self.rejected
            .get(&(domain.clone(), key.clone()))
            .is_some_and(|rejected| rejected == fp)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StateStore {
    inner: Mutex<DesiredState>,
}

impl StateStore {
    fn lock(&self) -> MutexGuard<'_, DesiredState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace everything `domain` owns. An empty set drops the domain.
    /// Returns whether the table changed.
    pub fn replace(&self, domain: ServiceDomain, services: DomainServices) -> bool {
        let mut state = self.lock();
        let changed = if services.is_empty() {
            state.domains.remove(&domain).is_some()
        } else if state.domains.get(&domain) == Some(&services) {
            false
        } else {
            state.domains.insert(domain.clone(), services);
            true
        };
        if changed {
            let owned = state.domains.get(&domain).cloned().unwrap_or_default();
            state
                .rejected
                .retain(|(d, k), _| d != &domain || owned.contains_key(k));
            state.dirty = true;
        }
        changed
    }

    /// Snapshot for a reconciliation pass; clears the dirty flag.
    pub fn snapshot_for_pass(&self) -> Snapshot {
        let mut state = self.lock();
        state.dirty = false;
        Snapshot {
            domains: state.domains.clone(),
            rejected: state.rejected.clone(),
        }
    }

    /// Record registry outcomes of a pass. A rejection only sticks while the
    /// domain still declares that exact definition.
    pub fn record_outcomes(
        &self,
        accepted: impl IntoIterator<Item = OwnedKey>,
        rejected: impl IntoIterator<Item = (OwnedKey, Fingerprint)>,
    ) {
        let mut state = self.lock();
        for owned in accepted {
            state.rejected.remove(&owned);
        }
        for ((domain, key), fp) in rejected {
            let current = state
                .domains
                .get(&domain)
                .and_then(|services| services.get(&key))
                .map(Service::fingerprint);
            if current.as_ref() == Some(&fp) {
                state.rejected.insert((domain, key), fp);
            }
        }
    }

    pub fn flattened(&self) -> Vec<Service> {
        self.lock()
            .domains
            .values()
            .flat_map(|services| services.values().cloned())
            .collect()
    }

    pub fn domains(&self) -> Vec<ServiceDomain> {
        self.lock().domains.keys().cloned().collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> DomainServices {
        names
            .iter()
            .map(|name| {
                let svc = Service::new(*name);
                (svc.key(), svc)
            })
            .collect()
    }

    #[test]
    fn replace_is_whole_set_and_reports_changes() {
        let store = StateStore::default();
        let d = ServiceDomain::new("exec-1");

        assert!(store.replace(d.clone(), set(&["a", "b"])));
        assert!(store.is_dirty());
        let _ = store.snapshot_for_pass();
        assert!(!store.is_dirty());

        assert!(!store.replace(d.clone(), set(&["a", "b"])));
        assert!(!store.is_dirty());

        assert!(store.replace(d.clone(), set(&["b"])));
        let names: Vec<_> = store.flattened().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b"]);

        assert!(store.replace(d.clone(), DomainServices::new()));
        assert!(store.domains().is_empty());
        assert!(!store.replace(d, DomainServices::new()));
    }

    #[test]
    fn rejection_marks_follow_the_definition() {
        let store = StateStore::default();
        let d = ServiceDomain::new("exec-1");
        let services = set(&["web"]);
        let (key, svc) = services
            .iter()
            .next()
            .map(|(k, s)| (k.clone(), s.clone()))
            .unwrap();
        store.replace(d.clone(), services);

        store.record_outcomes([], [((d.clone(), key.clone()), svc.fingerprint())]);
        assert!(store.snapshot_for_pass().is_rejected(&d, &key, &svc.fingerprint()));

        // Same definition again keeps the mark.
        store.replace(d.clone(), set(&["web"]));
        assert!(store.snapshot_for_pass().is_rejected(&d, &key, &svc.fingerprint()));

        // A stale rejection for a definition no longer declared is ignored.
        let mut changed = svc.clone();
        changed.port = Some(81);
        store.record_outcomes([], [((d.clone(), key.clone()), changed.fingerprint())]);
        assert!(!store.snapshot_for_pass().is_rejected(&d, &key, &changed.fingerprint()));

        store.record_outcomes([(d.clone(), key.clone())], []);
        assert!(!store.snapshot_for_pass().is_rejected(&d, &key, &svc.fingerprint()));
    }
}
