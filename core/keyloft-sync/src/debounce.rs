//! The change debouncer: coalesces local edits into one upload.
//!
//! Every UI mutation calls [`SyncEngine::notify_change`]; after a quiet
//! period the pending units are uploaded in a single pass. A flush that
//! fires while a sync is running reschedules itself: an auto-sync must
//! never silently drop a user edit. Failed units stay in the pending set
//! and ride the next cycle.
//!
//! Re-arming never aborts a timer. Each arm bumps a generation counter and
//! a timer that wakes to a newer generation exits on its own; a timer that
//! already started flushing finishes the flush. Aborting mid-flush would
//! strand the pass lock's mirror and lose in-flight units.

use crate::engine::{locked, stamp_map, PassGuard, SyncDirection, SyncEngine, SyncProgress};
use crate::error::SyncResult;
use crate::store::{object_name, RemoteObject};
use keyloft_types::SyncUnit;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

impl SyncEngine {
    /// Records a local edit to `unit` and (re)arms the upload timer.
    pub fn notify_change(&self, unit: SyncUnit) {
        self.mark_pending(unit);
        self.arm_debounce();
    }

    pub(crate) fn arm_debounce(&self) {
        let generation = self.shared.debounce_gen.fetch_add(1, Ordering::AcqRel) + 1;
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let delay = engine.shared.config.debounce_delay;
            loop {
                tokio::time::sleep(delay).await;
                if engine.shared.debounce_gen.load(Ordering::Acquire) != generation {
                    // A newer edit re-armed the timer; let it do the flush.
                    return;
                }
                if !engine.is_sync_in_progress() {
                    break;
                }
                debug!("sync in progress, rescheduling debounced upload");
            }
            if let Err(e) = engine.flush_pending().await {
                warn!("debounced upload failed: {e}");
            }
        });
        // Dropping the previous handle detaches it; the generation check
        // retires it at its next wake.
        locked(&self.shared.debounce_timer).replace(handle);
    }

    /// Uploads every pending unit now. Also run on shutdown so no local
    /// edit is lost. Returns without work when nothing is pending; if
    /// another pass holds the lock, the flush re-arms itself instead.
    pub async fn flush_pending(&self) -> SyncResult<()> {
        if !self.has_pending_changes() {
            return Ok(());
        }
        let Some(_guard) = PassGuard::try_acquire(&self.shared) else {
            self.arm_debounce();
            return Ok(());
        };
        self.run_flush().await
    }

    async fn run_flush(&self) -> SyncResult<()> {
        let units = self.pending_snapshot();
        if units.is_empty() {
            return Ok(());
        }

        // Stay pending until a password shows up.
        let Some(password) = self.shared.passwords.retrieve() else {
            return Ok(());
        };

        let listing = match self.shared.remote.list().await {
            Ok(listing) => listing,
            Err(e) => {
                self.emit(SyncProgress::failed(SyncDirection::Upload, e.to_string()));
                return Err(e);
            }
        };

        if !self.canary_validated() {
            if let Err(e) = self.validate_canary(&password, &listing).await {
                self.emit(SyncProgress::failed(SyncDirection::Upload, e.to_string()));
                return Err(e);
            }
        }

        let by_name: HashMap<String, RemoteObject> =
            listing.into_iter().map(|o| (o.name.clone(), o)).collect();

        let mut failed = Vec::new();
        for unit in &units {
            let existing = by_name.get(&object_name(unit));
            match self.push_unit(&password, unit, existing).await {
                Ok(()) => self.clear_pending(unit),
                Err(e) => {
                    warn!(unit = %unit, "pending upload failed: {e}");
                    failed.push(unit.to_string());
                }
            }
        }

        match self.shared.remote.list().await {
            Ok(fresh) => *locked(&self.shared.remote_seen) = Some(stamp_map(&fresh)),
            Err(e) => warn!("post-flush listing failed: {e}"),
        }

        // One aggregate event for the whole flush.
        self.emit(SyncProgress::finished(SyncDirection::Upload, failed));
        Ok(())
    }

    /// Stops background work and force-runs any pending flush so local
    /// edits survive process exit. The poller goes first: no new work once
    /// shutdown begins.
    pub async fn shutdown(&self) {
        self.stop_polling();

        // Supersede any armed timer and cancel it. Clear-on-success keeps
        // the pending set intact even if a flush was cut mid-flight.
        self.shared.debounce_gen.fetch_add(1, Ordering::AcqRel);
        if let Some(timer) = locked(&self.shared.debounce_timer).take() {
            timer.abort();
        }
        while self.is_sync_in_progress() {
            tokio::task::yield_now().await;
        }

        if self.has_pending_changes() {
            if let Err(e) = self.flush_pending().await {
                warn!("final flush failed: {e}");
            }
        }
    }
}
