use std::fmt;

use async_trait::async_trait;
use catalog_types::{Fingerprint, Service, ServiceDomain, ServiceKey};

use crate::error::RegistryError;

/// One registry entry that can be traced back to the domain and key that
/// registered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredService {
    pub id: RegistrationId,
    pub domain: ServiceDomain,
    pub key: ServiceKey,
    pub name: String,
    pub fingerprint: Fingerprint,
}

/// Registry-side identifier of a `(domain, key)` registration.
///
/// Rendered as `<prefix>-<domain>-<key>`. Keys are fixed-width hex, so two
/// distinct `(domain, key)` pairs never render the same id. Ownership is never
/// inferred by parsing or prefix-matching an id; adapters attribute entries
/// from registered metadata and then compare the rendered id for equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(String);

impl RegistrationId {
    pub fn new(prefix: &str, domain: &ServiceDomain, key: &ServiceKey) -> Self {
        Self(format!("{prefix}-{domain}-{key}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operations the syncer needs from a service-discovery registry.
///
/// Implementations bound every call by their own timeout policy.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Every registered entry this adapter can attribute. Entries it did not
    /// register (including the registry's own services) are omitted.
    async fn list_services(&self) -> Result<Vec<RegisteredService>, RegistryError>;

    /// Create or replace the registration for `(domain, key)`.
    async fn register(
        &self,
        domain: &ServiceDomain,
        key: &ServiceKey,
        service: &Service,
    ) -> Result<(), RegistryError>;

    /// Remove the registration for `(domain, key)`. Removing an absent entry
    /// succeeds.
    async fn deregister(
        &self,
        domain: &ServiceDomain,
        key: &ServiceKey,
    ) -> Result<(), RegistryError>;
}
