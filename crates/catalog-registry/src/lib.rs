//! Registry client adapters: the seam between the syncer and an external
//! service-discovery registry.

pub mod config;
pub mod consul;
pub mod error;
pub mod mem;
pub mod traits;

pub use config::{ConsulConfig, RegistryConfigError};
pub use consul::ConsulAgentRegistry;
pub use error::RegistryError;
pub use mem::MemRegistry;
pub use traits::{RegisteredService, RegistrationId, ServiceRegistry};

/// Metadata keys used to attribute a registry entry back to its owner.
pub const META_DOMAIN: &str = "catalog_domain";
pub const META_KEY: &str = "catalog_key";
pub const META_FINGERPRINT: &str = "catalog_fingerprint";
/// Digest of the tags, address and port as registered.
pub const META_PAYLOAD: &str = "catalog_payload";
