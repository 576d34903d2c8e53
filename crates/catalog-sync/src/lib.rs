//! Domain-keyed service reconciliation against an external registry.
//!
//! Many independent owners (one per task executor, plus the node agent) call
//! [`Syncer::set_services`] with the complete set of services their domain
//! should expose. The syncer merges those declarations into one desired-state
//! table and brings the registry in line with it:
//!
//! - [`Syncer::sync_services`] registers what is missing or changed and
//!   removes entries a tracked domain no longer declares;
//! - [`Syncer::reap_unmatched`] removes every registry entry whose domain is
//!   not in a caller-supplied live set;
//! - [`Syncer::run`] repeats the sync pass on an interval until
//!   [`Syncer::shutdown`].
//!
//! Ownership is always decided by exact `(domain, key)` identity.

pub mod config;
pub mod error;
mod ops;
mod reap;
mod reconcile;
mod state;
mod sync_loop;
mod syncer;

pub use config::{ConfigError, SyncerConfig};
pub use error::{
    AggregateSyncError, MalformedInput, OperationFailure, OperationKind, PassKind, SyncError,
};
pub use reap::ReapReport;
pub use reconcile::SyncReport;
pub use syncer::Syncer;
