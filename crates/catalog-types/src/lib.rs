//! Identity primitives and the service payload model shared by the registry
//! adapters and the syncer.

mod domain;
mod error;
mod key;
mod service;

pub use domain::ServiceDomain;
pub use error::{InvalidServiceKey, MalformedService};
pub use key::ServiceKey;
pub use service::{CheckKind, Fingerprint, Service, ServiceCheck};
