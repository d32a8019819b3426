/**
 * Process-wide identifier service.
 *
 * Objects and signal connections both draw their identifiers from the
 * single generator below. Identifiers are unique for the lifetime of
 * the process; zero is reserved as "invalid" and is never issued.
 */
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier for objects and signal connections.
pub type Id = u64;

/// The reserved "no such thing" identifier. Never returned by `next_id`.
pub const INVALID_ID: Id = 0;

/// The generator. Starts at 1 so `INVALID_ID` stays unissued.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/**
 * Returns a fresh identifier.
 *
 * Wait-free (a single atomic fetch-add) and collision-free across all
 * threads. A u64 does not wrap within any realistic process lifetime.
 */
pub fn next_id() -> Id {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    /**
     * Verifies that concurrent generation never hands out a duplicate
     * and never hands out the reserved invalid id.
     */
    #[test]
    fn test_ids_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| thread::spawn(|| (0..1000).map(|_| next_id()).collect::<Vec<Id>>()))
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("generator thread panicked") {
                assert_ne!(id, INVALID_ID);
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
