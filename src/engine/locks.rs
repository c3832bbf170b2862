use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::stats::MonthKey;

/// One async mutex per month. Holding the guard makes a workbook's
/// fetch-modify-store exclusive within this process; other months are not
/// blocked.
#[derive(Debug, Default)]
pub struct MonthLocks {
    locks: Mutex<HashMap<MonthKey, Arc<AsyncMutex<()>>>>,
}

impl MonthLocks {
    pub fn new() -> Self {
        MonthLocks::default()
    }

    pub async fn lock(&self, month: MonthKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Only the registry refers to an idle month's mutex.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(locks.entry(month).or_default())
        };
        lock.lock_owned().await
    }

    /// Months with a registered mutex.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
