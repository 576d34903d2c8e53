//! In-memory registry with fault injection, for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use catalog_types::{Service, ServiceDomain, ServiceKey};

use crate::error::RegistryError;
use crate::traits::{RegisteredService, RegistrationId, ServiceRegistry};

#[derive(Debug, Clone)]
struct MemEntry {
    domain: ServiceDomain,
    key: ServiceKey,
    service: Service,
}

#[derive(Debug, Default)]
struct MemState {
    entries: BTreeMap<RegistrationId, MemEntry>,
    /// Entries registered by someone else, keyed by id, valued by name.
    foreign: BTreeMap<String, String>,
    rejected_names: HashSet<String>,
}

/// Registry held entirely in process memory.
///
/// Every clone of an `Arc<MemRegistry>` sees the same entries, so several
/// syncers can share one registry the way they would share a real agent.
#[derive(Debug)]
pub struct MemRegistry {
    id_prefix: String,
    state: Mutex<MemState>,
    unavailable: AtomicBool,
    latency_ms: AtomicUsize,
    list_calls: AtomicUsize,
    register_calls: AtomicUsize,
    deregister_calls: AtomicUsize,
}

impl Default for MemRegistry {
    fn default() -> Self {
        Self::new("_catalog")
    }
}

impl MemRegistry {
    pub fn new(id_prefix: impl Into<String>) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            state: Mutex::new(MemState::default()),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            deregister_calls: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail every subsequent call with `Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call, to widen race windows in concurrency tests.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as usize, Ordering::SeqCst);
    }

    /// Reject registrations of services with this name.
    pub fn reject_name(&self, name: impl Into<String>) {
        self.state().rejected_names.insert(name.into());
    }

    pub fn accept_name(&self, name: &str) {
        self.state().rejected_names.remove(name);
    }

    /// Add an entry this registry's adapter did not create, such as the
    /// registry's own service.
    pub fn insert_foreign(&self, id: impl Into<String>, name: impl Into<String>) {
        self.state().foreign.insert(id.into(), name.into());
    }

    pub fn foreign_count(&self) -> usize {
        self.state().foreign.len()
    }

    pub fn get(&self, domain: &ServiceDomain, key: &ServiceKey) -> Option<Service> {
        let id = RegistrationId::new(&self.id_prefix, domain, key);
        self.state().entries.get(&id).map(|e| e.service.clone())
    }

    /// Names of every attributable entry.
    pub fn service_names(&self) -> BTreeSet<String> {
        self.state()
            .entries
            .values()
            .map(|e| e.service.name.clone())
            .collect()
    }

    pub fn names_in(&self, domain: &ServiceDomain) -> BTreeSet<String> {
        self.state()
            .entries
            .values()
            .filter(|e| &e.domain == domain)
            .map(|e| e.service.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn deregister_calls(&self) -> usize {
        self.deregister_calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.list_calls.store(0, Ordering::SeqCst);
        self.register_calls.store(0, Ordering::SeqCst);
        self.deregister_calls.store(0, Ordering::SeqCst);
    }

    async fn enter(&self, counter: &AtomicUsize) -> Result<(), RegistryError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency as u64)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::unavailable("memory registry is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceRegistry for MemRegistry {
    async fn list_services(&self) -> Result<Vec<RegisteredService>, RegistryError> {
        self.enter(&self.list_calls).await?;
        let state = self.state();
        Ok(state
            .entries
            .iter()
            .map(|(id, entry)| RegisteredService {
                id: id.clone(),
                domain: entry.domain.clone(),
                key: entry.key.clone(),
                name: entry.service.name.clone(),
                fingerprint: entry.service.fingerprint(),
            })
            .collect())
    }

    async fn register(
        &self,
        domain: &ServiceDomain,
        key: &ServiceKey,
        service: &Service,
    ) -> Result<(), RegistryError> {
        self.enter(&self.register_calls).await?;
        let mut state = self.state();
        if state.rejected_names.contains(&service.name) {
            return Err(RegistryError::rejected(
                400,
                format!("service '{}' is not accepted", service.name),
            ));
        }
        let id = RegistrationId::new(&self.id_prefix, domain, key);
        state.entries.insert(
            id,
            MemEntry {
                domain: domain.clone(),
                key: key.clone(),
                service: service.clone(),
            },
        );
        Ok(())
    }

    async fn deregister(
        &self,
        domain: &ServiceDomain,
        key: &ServiceKey,
    ) -> Result<(), RegistryError> {
        self.enter(&self.deregister_calls).await?;
        let id = RegistrationId::new(&self.id_prefix, domain, key);
        self.state().entries.remove(&id);
        Ok(())
    }
}
