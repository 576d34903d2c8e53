//! Shared helpers for the syncer integration tests.
//!
//! Each test binary compiles this module separately, so some helpers are
//! unused in some binaries.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use catalog_registry::MemRegistry;
use catalog_sync::{Syncer, SyncerConfig};
use catalog_types::{Service, ServiceKey};
use tracing_subscriber::EnvFilter;

/// Route syncer logs to the test harness; `RUST_LOG=catalog_sync=debug`
/// shows every pass.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fast_config() -> SyncerConfig {
    SyncerConfig {
        sync_interval: Duration::from_millis(20),
        operation_timeout: Duration::from_secs(2),
        ..SyncerConfig::default()
    }
}

pub fn syncer(registry: &Arc<MemRegistry>, config: SyncerConfig) -> Arc<Syncer> {
    Arc::new(Syncer::new(registry.clone(), config))
}

pub fn services(names: &[&str]) -> BTreeMap<ServiceKey, Service> {
    names.iter().map(|name| keyed(Service::new(*name))).collect()
}

pub fn keyed(service: Service) -> (ServiceKey, Service) {
    (service.key(), service)
}

pub fn names<'a>(items: impl IntoIterator<Item = &'a str>) -> std::collections::BTreeSet<String> {
    items.into_iter().map(str::to_string).collect()
}
