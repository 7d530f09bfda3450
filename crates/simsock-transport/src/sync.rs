use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Callbacks never run under simsock's locks, so a poisoned guard only means
/// a panic inside simsock itself; the protected state is still consistent.
/// The frame and peer layers lock through this too.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
