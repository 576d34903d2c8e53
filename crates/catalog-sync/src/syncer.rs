use std::collections::BTreeMap;
use std::sync::Arc;

use catalog_registry::{RegistryError, ServiceRegistry};
use catalog_types::{Service, ServiceDomain, ServiceKey};
use tokio::sync::{Mutex, Notify, watch};
use tracing::{debug, info};

use crate::config::SyncerConfig;
use crate::error::{AggregateSyncError, MalformedInput, PassKind, SyncError};
use crate::ops::{self, OpOutcome, RegistryOp};
use crate::reap::{ReapReport, plan_reap};
use crate::reconcile::{SyncReport, plan_sync};
use crate::state::StateStore;

/// Keeps a service registry consistent with the services every domain
/// declares.
///
/// Share it behind an `Arc`: executors call [`Syncer::set_services`],
/// lifecycle handlers call [`Syncer::reap_unmatched`], and one task drives
/// [`Syncer::run`].
pub struct Syncer {
    registry: Arc<dyn ServiceRegistry>,
    pub(crate) config: SyncerConfig,
    state: StateStore,
    /// Serializes sync passes; never held by `set_services`.
    pass_lock: Mutex<()>,
    pub(crate) wake: Notify,
    pub(crate) shutdown_tx: watch::Sender<bool>,
}

impl Syncer {
    pub fn new(registry: Arc<dyn ServiceRegistry>, config: SyncerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry,
            config: config.normalized(),
            state: StateStore::default(),
            pass_lock: Mutex::new(()),
            wake: Notify::new(),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &SyncerConfig {
        &self.config
    }

    /// Replace the complete set of services owned by `domain`.
    ///
    /// Callers pass the domain's full current set every time. An empty map
    /// stops tracking the domain; entries it already registered stay until a
    /// [`Syncer::reap_unmatched`] call that omits the domain.
    ///
    /// Only malformed input fails, and then nothing is applied.
    pub fn set_services(
        &self,
        domain: ServiceDomain,
        services: BTreeMap<ServiceKey, Service>,
    ) -> Result<(), SyncError> {
        validate(&domain, &services).map_err(|reason| SyncError::MalformedInput {
            domain: domain.clone(),
            reason,
        })?;
        let count = services.len();
        if self.state.replace(domain.clone(), services) {
            debug!(domain = %domain, services = count, "desired services updated");
            if self.config.sync_on_change {
                self.wake.notify_one();
            }
        }
        Ok(())
    }

    /// Run one reconciliation pass against the registry.
    pub async fn sync_services(&self) -> Result<SyncReport, SyncError> {
        let _pass = self.pass_lock.lock().await;

        // List before snapshotting: anything observed is then judged against
        // desired state at least as new as the listing.
        let observed = self
            .registry
            .list_services()
            .await
            .map_err(SyncError::ListFailed)?;
        let desired = self.state.snapshot_for_pass();
        let plan = plan_sync(&desired, &observed);

        let mut report = SyncReport {
            unchanged: plan.unchanged,
            skipped_rejected: plan.skipped_rejected,
            ..SyncReport::default()
        };
        let attempted = plan.ops.len();
        let outcomes = ops::execute_all(self.registry.as_ref(), plan.ops, &self.config).await;

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut failures = Vec::new();
        for OpOutcome { op, result } in outcomes {
            match (result, &op) {
                (Ok(()), RegistryOp::Register { domain, key, .. }) => {
                    report.registered += 1;
                    accepted.push((domain.clone(), key.clone()));
                }
                (Ok(()), RegistryOp::Deregister { .. }) => report.deregistered += 1,
                (Err(err), _) => {
                    if let RegistryOp::Register {
                        domain,
                        key,
                        service,
                    } = &op
                    {
                        if matches!(err, RegistryError::Rejected { .. }) {
                            rejected.push(((domain.clone(), key.clone()), service.fingerprint()));
                        }
                    }
                    failures.push(op.failure(err));
                }
            }
        }
        self.state.record_outcomes(accepted, rejected);

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(AggregateSyncError {
                pass: PassKind::Sync,
                attempted,
                failures,
            }
            .into())
        }
    }

    /// Deregister every registry entry whose domain is not in `live`.
    ///
    /// Works from the registry's own listing; the desired-state table is
    /// neither consulted nor changed.
    pub async fn reap_unmatched(&self, live: &[ServiceDomain]) -> Result<ReapReport, SyncError> {
        let observed = self
            .registry
            .list_services()
            .await
            .map_err(SyncError::ListFailed)?;
        let plan = plan_reap(&observed, live);
        for (domain, doomed) in &plan.by_domain {
            info!(domain = %domain, services = doomed.len(), "reaping services of unmatched domain");
        }

        let retained = plan.retained;
        let ops = plan.into_ops();
        let attempted = ops.len();
        let outcomes = ops::execute_all(self.registry.as_ref(), ops, &self.config).await;

        let mut reaped = 0;
        let mut failures = Vec::new();
        for OpOutcome { op, result } in outcomes {
            match result {
                Ok(()) => reaped += 1,
                Err(err) => failures.push(op.failure(err)),
            }
        }

        if failures.is_empty() {
            Ok(ReapReport { reaped, retained })
        } else {
            Err(AggregateSyncError {
                pass: PassKind::Reap,
                attempted,
                failures,
            }
            .into())
        }
    }

    /// Every desired service across all domains, ordered by domain then key.
    pub fn flattened_services(&self) -> Vec<Service> {
        self.state.flattened()
    }

    pub fn domains(&self) -> Vec<ServiceDomain> {
        self.state.domains()
    }

    /// Whether desired state changed since the last pass started.
    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }
}

fn validate(
    domain: &ServiceDomain,
    services: &BTreeMap<ServiceKey, Service>,
) -> Result<(), MalformedInput> {
    if domain.as_str().trim().is_empty() {
        return Err(MalformedInput::EmptyDomain);
    }
    for (key, service) in services {
        service.validate()?;
        let expected = service.key();
        if &expected != key {
            return Err(MalformedInput::KeyMismatch {
                service: service.name.clone(),
                expected,
                found: key.clone(),
            });
        }
    }
    Ok(())
}
