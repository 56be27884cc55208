//! Per-application cooldown tracking.
//!
//! Each application owns an `AtomicU64` cell holding the epoch second of
//! its last scaling action (0 = never). The map is write-locked only to
//! insert a new application's cell; the check-and-set itself is a CAS on
//! that cell, so evaluations of different applications never contend and
//! concurrent evaluations of the same application admit at most one
//! action per cooldown period.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

/// Outcome of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownResult {
    /// The caller owns this action; `last_action_at` now equals `now`.
    Acquired,
    /// An action happened too recently.
    Blocked { remaining_secs: u64 },
}

#[derive(Default)]
pub struct CooldownTracker {
    cells: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check the cooldown and record `now` as the last action.
    ///
    /// A `now` earlier than the recorded action (clock skew) counts as zero
    /// elapsed time and blocks.
    pub async fn try_acquire(&self, app_id: &str, cooldown_secs: u64, now: u64) -> CooldownResult {
        let cell = self.cell(app_id).await;
        let mut last = cell.load(Ordering::Acquire);
        loop {
            if last != 0 {
                let elapsed = now.saturating_sub(last);
                if elapsed < cooldown_secs {
                    return CooldownResult::Blocked {
                        remaining_secs: cooldown_secs - elapsed,
                    };
                }
            }
            match cell.compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return CooldownResult::Acquired,
                Err(actual) => last = actual,
            }
        }
    }

    /// Epoch second of the last recorded action.
    pub async fn last_action(&self, app_id: &str) -> Option<u64> {
        let cells = self.cells.read().await;
        cells
            .get(app_id)
            .map(|c| c.load(Ordering::Acquire))
            .filter(|&t| t != 0)
    }

    /// Drop the cell of a detached application.
    ///
    /// A cell still held by an in-flight `try_acquire` is kept, so that
    /// cycle's action keeps blocking its peers. Returns whether the cell
    /// was removed.
    pub async fn forget(&self, app_id: &str) -> bool {
        let mut cells = self.cells.write().await;
        match cells.get(app_id) {
            Some(cell) if Arc::strong_count(cell) == 1 => {
                cells.remove(app_id);
                true
            }
            _ => false,
        }
    }

    /// Forget every application not in `active`. Returns the number of
    /// cells removed.
    pub async fn retain_apps(&self, active: &[String]) -> usize {
        let mut cells = self.cells.write().await;
        let before = cells.len();
        cells.retain(|app_id, cell| {
            active.iter().any(|a| a == app_id) || Arc::strong_count(cell) > 1
        });
        before - cells.len()
    }

    pub async fn tracked(&self) -> usize {
        self.cells.read().await.len()
    }

    async fn cell(&self, app_id: &str) -> Arc<AtomicU64> {
        if let Some(cell) = self.cells.read().await.get(app_id) {
            return cell.clone();
        }
        let mut cells = self.cells.write().await;
        cells
            .entry(app_id.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }
}
