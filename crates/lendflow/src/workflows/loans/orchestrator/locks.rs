use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::workflows::loans::domain::LoanId;

/// One async mutex per loan; every state-mutating operation runs while holding it.
#[derive(Debug, Default)]
pub struct LoanLocks {
    locks: Mutex<HashMap<LoanId, Arc<AsyncMutex<()>>>>,
}

impl LoanLocks {
    pub async fn acquire(&self, loan_id: LoanId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Idle entries are only referenced by the map.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(loan_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
