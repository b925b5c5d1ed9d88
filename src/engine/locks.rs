use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};
use crate::engine::EngineError;

/// Process-wide set of lots currently being assigned
///
/// Holding a [`LotGuard`] grants exclusive access to one lot id. Waiters block
/// for at most the timeout passed to [`LotLocks::acquire`] and then fail with
/// [`EngineError::ConcurrentModification`]. Different lot ids never contend.
#[derive(Default)]
pub struct LotLocks {
    held: Mutex<HashSet<i64>>,
    released: Condvar,
}

/// Exclusive hold on one lot; released on drop
pub struct LotGuard<'a> {
    locks: &'a LotLocks,
    lot_id: i64,
}

impl LotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock table shared by every engine in this process
    pub fn global() -> Arc<LotLocks> {
        static GLOBAL_LOCKS: OnceLock<Arc<LotLocks>> = OnceLock::new();
        GLOBAL_LOCKS.get_or_init(|| Arc::new(LotLocks::new())).clone()
    }

    /// Wait up to `timeout` for exclusive access to `lot_id`
    pub fn acquire(&self, lot_id: i64, timeout: Duration) -> Result<LotGuard<'_>, EngineError> {
        let started = Instant::now();
        // None waits until the lot is released
        let deadline = started.checked_add(timeout);
        let mut held = self.lock_table();

        while held.contains(&lot_id) {
            log::debug!("Waiting for lot {} to be released", lot_id);
            held = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(EngineError::ConcurrentModification {
                            lot_id,
                            waited_ms: elapsed_ms(started),
                        });
                    }
                    self.released
                        .wait_timeout(held, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|err| err.into_inner().0)
                }
                None => self
                    .released
                    .wait(held)
                    .unwrap_or_else(|err| err.into_inner()),
            };
        }

        held.insert(lot_id);
        Ok(LotGuard { locks: self, lot_id })
    }

    /// Whether some caller currently holds `lot_id`
    pub fn is_held(&self, lot_id: i64) -> bool {
        self.lock_table().contains(&lot_id)
    }

    fn lock_table(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.held.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Milliseconds since `started`, saturating
pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl LotGuard<'_> {
    pub fn lot_id(&self) -> i64 {
        self.lot_id
    }
}

impl Drop for LotGuard<'_> {
    fn drop(&mut self) {
        self.locks.lock_table().remove(&self.lot_id);
        self.locks.released.notify_all();
    }
}
