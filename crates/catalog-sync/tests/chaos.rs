//! Concurrent declaration, sync and reap against one shared registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use catalog_registry::MemRegistry;
use catalog_types::ServiceDomain;

mod common;

use common::{fast_config, init_tracing, services, syncer};

const DOMAINS: usize = 100;
const PER_DOMAIN: usize = 10;

fn domain(i: usize) -> ServiceDomain {
    ServiceDomain::new(format!("exec-{i}"))
}

fn domain_services(i: usize) -> Vec<String> {
    (0..PER_DOMAIN).map(|j| format!("svc-{i}-{j}")).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_set_sync_and_reap_settle_to_live_domain() -> anyhow::Result<()> {
    init_tracing();
    let registry = Arc::new(MemRegistry::default());
    let syncer = syncer(&registry, fast_config());

    let mut tasks = Vec::with_capacity(DOMAINS);
    for i in 0..DOMAINS {
        let syncer = syncer.clone();
        tasks.push(tokio::spawn(async move {
            let names = domain_services(i);
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            syncer.set_services(domain(i), services(&names))?;
            // Pass errors are tolerated mid-chaos; only the settled state counts.
            let _ = syncer.sync_services().await;
            let _ = syncer.reap_unmatched(&[domain(0), domain(i)]).await;
            anyhow::Ok(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    let report = syncer.reap_unmatched(&[domain(0)]).await?;
    assert_eq!(report.retained, registry.len());

    let want: BTreeSet<String> = domain_services(0).into_iter().collect();
    assert_eq!(registry.service_names(), want);
    assert_eq!(registry.names_in(&domain(0)), want);

    // Reaping never touches desired state.
    let flattened = syncer.flattened_services();
    assert_eq!(flattened.len(), DOMAINS * PER_DOMAIN);
    assert_eq!(syncer.domains().len(), DOMAINS);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn disjoint_domains_do_not_disturb_each_other() -> anyhow::Result<()> {
    init_tracing();
    let registry = Arc::new(MemRegistry::default());
    let syncer = syncer(&registry, fast_config());

    let mut tasks = Vec::new();
    for i in 0..32 {
        let syncer = syncer.clone();
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let names = domain_services(i);
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            syncer.set_services(domain(i), services(&names))?;
            syncer.sync_services().await?;

            let want: BTreeSet<String> = domain_services(i).into_iter().collect();
            anyhow::ensure!(
                registry.names_in(&domain(i)) == want,
                "domain {i} lost services"
            );

            // Shrink to one service; siblings keep theirs.
            syncer.set_services(domain(i), services(&[names[0]]))?;
            syncer.sync_services().await?;
            anyhow::Ok(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    for i in 0..32 {
        let want: BTreeSet<String> = [format!("svc-{i}-0")].into_iter().collect();
        assert_eq!(registry.names_in(&domain(i)), want);
    }
    assert_eq!(registry.len(), 32);
    Ok(())
}
