use catalog_registry::{RegistryError, ServiceRegistry};
use catalog_types::{Service, ServiceDomain, ServiceKey};
use futures_util::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::warn;

use crate::config::SyncerConfig;
use crate::error::{OperationFailure, OperationKind};

/// A single registry mutation planned by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RegistryOp {
    Register {
        domain: ServiceDomain,
        key: ServiceKey,
        service: Service,
    },
    Deregister {
        domain: ServiceDomain,
        key: ServiceKey,
        name: String,
    },
}

impl RegistryOp {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Register { .. } => OperationKind::Register,
            Self::Deregister { .. } => OperationKind::Deregister,
        }
    }

    pub fn domain(&self) -> &ServiceDomain {
        match self {
            Self::Register { domain, .. } | Self::Deregister { domain, .. } => domain,
        }
    }

    pub fn key(&self) -> &ServiceKey {
        match self {
            Self::Register { key, .. } | Self::Deregister { key, .. } => key,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Register { service, .. } => &service.name,
            Self::Deregister { name, .. } => name,
        }
    }

    async fn execute(&self, registry: &dyn ServiceRegistry) -> Result<(), RegistryError> {
        match self {
            Self::Register {
                domain,
                key,
                service,
            } => registry.register(domain, key, service).await,
            Self::Deregister { domain, key, .. } => registry.deregister(domain, key).await,
        }
    }

    pub fn failure(&self, error: RegistryError) -> OperationFailure {
        OperationFailure {
            kind: self.kind(),
            domain: self.domain().clone(),
            key: self.key().clone(),
            service: self.name().to_string(),
            error,
        }
    }
}

#[derive(Debug)]
pub(crate) struct OpOutcome {
    pub op: RegistryOp,
    pub result: Result<(), RegistryError>,
}

/// Run every op, at most `max_concurrent_ops` at a time. A failed op never
/// stops the others.
pub(crate) async fn execute_all(
    registry: &dyn ServiceRegistry,
    ops: Vec<RegistryOp>,
    config: &SyncerConfig,
) -> Vec<OpOutcome> {
    let op_timeout = config.operation_timeout;
    stream::iter(ops)
        .map(move |op| async move {
            let result = match timeout(op_timeout, op.execute(registry)).await {
                Ok(result) => result,
                Err(_) => Err(RegistryError::unavailable(format!(
                    "{} timed out after {op_timeout:?}",
                    op.kind()
                ))),
            };
            if let Err(err) = &result {
                warn!(
                    op = %op.kind(),
                    domain = %op.domain(),
                    key = %op.key(),
                    service = op.name(),
                    error = %err,
                    "registry operation failed"
                );
            }
            OpOutcome { op, result }
        })
        .buffer_unordered(config.max_concurrent_ops)
        .collect()
        .await
}
