/**
 * Lock acquisition helper shared by the kernel.
 *
 * Framework locks are never held across user code (slots run outside
 * every critical section), so a poisoned lock can only mean a kernel
 * invariant already failed on another thread. Recovering the guard via
 * `PoisonError::into_inner` keeps the queue and loop state reachable
 * instead of cascading the failure into every later caller.
 */
use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
