use std::fmt;

use catalog_registry::RegistryError;
use catalog_types::{MalformedService, ServiceDomain, ServiceKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// `set_services` was given a declaration it cannot accept. Nothing was
    /// applied.
    #[error("malformed services for domain '{domain}': {reason}")]
    MalformedInput {
        domain: ServiceDomain,
        reason: MalformedInput,
    },
    /// The registry could not be listed, so the pass planned nothing.
    #[error("failed to list registry services: {0}")]
    ListFailed(#[source] RegistryError),
    /// Some operations of a pass failed; every other planned operation was
    /// still attempted.
    #[error(transparent)]
    Aggregate(#[from] AggregateSyncError),
}

impl SyncError {
    /// Per-operation failures, empty unless this is an aggregate error.
    pub fn failures(&self) -> &[OperationFailure] {
        match self {
            Self::Aggregate(agg) => &agg.failures,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedInput {
    #[error("domain name must not be empty")]
    EmptyDomain,
    #[error("service '{service}' is keyed as {found} but derives key {expected}")]
    KeyMismatch {
        service: String,
        expected: ServiceKey,
        found: ServiceKey,
    },
    #[error(transparent)]
    Service(#[from] MalformedService),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Register,
    Deregister,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register => f.write_str("register"),
            Self::Deregister => f.write_str("deregister"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Sync,
    Reap,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => f.write_str("sync"),
            Self::Reap => f.write_str("reap"),
        }
    }
}

/// One registry call that failed during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} '{service}' (domain {domain}, key {key}): {error}")]
pub struct OperationFailure {
    pub kind: OperationKind,
    pub domain: ServiceDomain,
    pub key: ServiceKey,
    pub service: String,
    #[source]
    pub error: RegistryError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSyncError {
    pub pass: PassKind,
    pub attempted: usize,
    pub failures: Vec<OperationFailure>,
}

impl AggregateSyncError {
    /// Failures the registry may accept on a later pass.
    pub fn transient(&self) -> impl Iterator<Item = &OperationFailure> {
        self.failures.iter().filter(|f| f.error.is_transient())
    }

    /// Failures the registry refused as written.
    pub fn rejected(&self) -> impl Iterator<Item = &OperationFailure> {
        self.failures.iter().filter(|f| !f.error.is_transient())
    }
}

impl fmt::Display for AggregateSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} registry operations failed during {} pass",
            self.failures.len(),
            self.attempted,
            self.pass
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateSyncError {}
