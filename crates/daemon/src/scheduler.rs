//! Built-in interval trigger

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use attention_payout::PayoutCycle;

/// Handle to a running scheduler loop
pub struct Scheduler {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Stop scheduling and wait for the loop to exit.
    ///
    /// A cycle already in progress runs to completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
        info!("Scheduler stopped");
    }
}

/// Run a payout cycle every `every`, starting one interval from now.
///
/// Returns `None` when `every` is zero (scheduler disabled). A tick that
/// lands while another cycle is running is skipped.
pub fn spawn_scheduler(cycle: Arc<PayoutCycle>, every: Duration) -> Option<Scheduler> {
    if every.is_zero() {
        info!("Built-in scheduler disabled");
        return None;
    }

    info!("Scheduling payout cycles every {}s", every.as_secs());
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    // Not raced against shutdown: a started cycle always finishes
                    match cycle.try_run().await {
                        Some(summary) => debug!("Scheduled cycle {} done", summary.batch_id),
                        None => info!("Payout cycle already running, skipping scheduled run"),
                    }
                }
            }
        }
    });

    Some(Scheduler { shutdown_tx, handle })
}
