//! The remote poller: detects foreign changes by stamp comparison.
//!
//! On an interval, list the remote store and diff each object's modification
//! stamp against the last-seen baseline; only changed objects are downloaded
//! and merged. The very first listing only records the baseline; startup
//! must not implicitly pull the whole remote. Failures are logged and
//! swallowed; the next tick self-heals.

use crate::engine::{locked, stamp_map, SyncEngine};
use crate::error::SyncResult;
use crate::store::decode_object_name;
use tracing::{debug, info, warn};

impl SyncEngine {
    /// Starts the poll loop. Idempotent: a second call is a no-op.
    pub fn start_polling(&self) {
        let mut slot = locked(&self.shared.poll_task);
        if slot.is_some() {
            return;
        }
        let engine = self.clone();
        let interval = self.shared.config.poll_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The zeroth tick fires immediately; the first real poll should
            // happen one full interval after start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = engine.poll_once().await {
                    debug!("poll tick failed: {e}");
                }
            }
        }));
        info!(interval_secs = interval.as_secs(), "remote polling started");
    }

    /// Stops the poll loop. Idempotent.
    pub fn stop_polling(&self) {
        if let Some(task) = locked(&self.shared.poll_task).take() {
            task.abort();
            info!("remote polling stopped");
        }
    }

    /// Runs a single poll cycle.
    pub async fn poll_once(&self) -> SyncResult<()> {
        if self.is_sync_in_progress() {
            debug!("sync in progress, skipping poll tick");
            return Ok(());
        }
        let Some(password) = self.shared.passwords.retrieve() else {
            return Ok(());
        };

        let listing = self.shared.remote.list().await?;

        let baseline = match locked(&self.shared.remote_seen).clone() {
            Some(baseline) => baseline,
            None => {
                // First sight of the remote: record, don't pull.
                *locked(&self.shared.remote_seen) = Some(stamp_map(&listing));
                debug!(objects = listing.len(), "recorded initial remote baseline");
                return Ok(());
            }
        };

        let changed: Vec<_> = listing
            .iter()
            .filter(|o| baseline.get(&o.name) != Some(&o.modified_time))
            .filter_map(|o| decode_object_name(&o.name).map(|unit| (unit, o)))
            .collect();

        let mut next = stamp_map(&listing);
        for (unit, obj) in &changed {
            match self.pull_unit(&password, unit, obj).await {
                Ok(()) => info!(unit = %unit, "merged remote change"),
                Err(e) => {
                    warn!(unit = %unit, "failed to merge remote change: {e}");
                    // Keep the old stamp so the next tick retries this one.
                    match baseline.get(&obj.name) {
                        Some(old) => {
                            next.insert(obj.name.clone(), old.clone());
                        }
                        None => {
                            next.remove(&obj.name);
                        }
                    }
                }
            }
        }

        *locked(&self.shared.remote_seen) = Some(next);
        Ok(())
    }
}
