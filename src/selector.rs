use crate::db::{self, PendingEntry, Pool};
use anyhow::Result;

/// Picks the entries a run should work on.
///
/// Only the newest `window` pending entries are considered, so a run can end
/// with quota left while older entries are still pending.
#[derive(Debug, Clone, Copy)]
pub struct Selector {
    /// Upper bound on pending entries examined per run.
    window: i64,
}

impl Selector {
    pub fn new(window: i64) -> Self {
        Self { window }
    }

    /// Pending entries, newest insertion first. Stateless: repeated calls
    /// without intervening deliveries return the same list.
    pub async fn pending(&self, pool: &Pool) -> Result<Vec<PendingEntry>> {
        db::select_pending(pool, self.window).await
    }
}

/// Counts entries that reached at least one channel during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    limit: usize,
    used: usize,
}

impl Quota {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }

    pub fn consume(&mut self) {
        self.used += 1;
    }

    pub fn used(&self) -> usize {
        self.used
    }
}
