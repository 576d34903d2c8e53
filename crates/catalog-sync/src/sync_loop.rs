//! Periodic reconciliation with cooperative shutdown.

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::syncer::Syncer;

impl Syncer {
    /// Reconcile on every `sync_interval` tick, and whenever
    /// [`Syncer::sync_now`] is called, until [`Syncer::shutdown`].
    ///
    /// A pass in flight when shutdown arrives runs to completion; one final
    /// best-effort pass follows before returning. Reaping is never done here.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.config.sync_interval.as_millis() as u64,
            "service syncer started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => self.periodic_pass("interval").await,
                _ = self.wake.notified() => self.periodic_pass("requested").await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("service syncer stopping; running final sync");
        self.periodic_pass("shutdown").await;
        info!("service syncer stopped");
    }

    /// Ask a running loop for an immediate pass. If the loop is busy, the
    /// request is held for when it next waits.
    pub fn sync_now(&self) {
        self.wake.notify_one();
    }

    /// Stop [`Syncer::run`]. Safe to call any number of times, before or
    /// after the loop starts.
    pub fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            debug!("service syncer shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    async fn periodic_pass(&self, trigger: &'static str) {
        match self.sync_services().await {
            Ok(report) if report.changed() => info!(
                trigger,
                registered = report.registered,
                deregistered = report.deregistered,
                unchanged = report.unchanged,
                "service sync completed"
            ),
            Ok(report) => debug!(
                trigger,
                unchanged = report.unchanged,
                skipped_rejected = report.skipped_rejected,
                "service sync found nothing to do"
            ),
            Err(err) => warn!(trigger, error = %err, "service sync failed"),
        }
    }
}
