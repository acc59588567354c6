use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Every mutex in this crate guards plain bookkeeping (queues, counters,
/// maps of GL names) that stays structurally valid across a panic, so a
/// poisoned lock is treated as an ordinary one.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
