/**
 * The FIFO event queue owned by every event loop.
 *
 * One `Mutex<VecDeque>` plus one `Condvar`. Producers push from any
 * thread; the single consumer either drains the whole pending batch in
 * one lock acquisition or blocks until something arrives. FIFO order is
 * preserved per producer; cross-producer order is the serialization
 * order of the pushes.
 *
 * The queue knows nothing about loop states. The consumer passes its
 * stop flag into `wait_nonempty` so one condition variable covers both
 * "work arrived" and "stop requested" wakeups, and hands back any
 * unconsumed remainder through `requeue_front` when a stop interrupts a
 * batch mid-way.
 */
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use crate::event::Event;
use crate::sync::lock;

pub(crate) struct EventQueue {
    pending: Mutex<VecDeque<Event>>,
    nonempty: Condvar,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            nonempty: Condvar::new(),
        }
    }

    /**
     * Appends an event and wakes any blocked consumer.
     * Safe from any thread; never blocks beyond the uncontended mutex.
     */
    pub(crate) fn push(&self, event: Event) {
        lock(&self.pending).push_back(event);
        self.nonempty.notify_all();
    }

    /**
     * Transfers the entire pending batch to the caller, leaving the
     * queue empty. A single lock acquisition; ownership moves out.
     */
    pub(crate) fn drain(&self) -> VecDeque<Event> {
        std::mem::take(&mut *lock(&self.pending))
    }

    /**
     * Returns an unconsumed batch remainder to the head of the queue,
     * preserving its internal order ahead of anything pushed since.
     */
    pub(crate) fn requeue_front(&self, remainder: VecDeque<Event>) {
        let mut pending = lock(&self.pending);
        for event in remainder.into_iter().rev() {
            pending.push_front(event);
        }
    }

    /**
     * Blocks the caller until the queue is non-empty or `stop` is set.
     *
     * The stop flag is re-checked under the queue lock on every wakeup,
     * so a `notify_all` issued after setting the flag is never lost.
     */
    pub(crate) fn wait_nonempty(&self, stop: &AtomicBool) {
        let mut pending = lock(&self.pending);
        while pending.is_empty() && !stop.load(Ordering::SeqCst) {
            pending = self
                .nonempty
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wakes every thread blocked in `wait_nonempty`. Used by stop paths.
    pub(crate) fn notify_all(&self) {
        self.nonempty.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /**
     * Verifies FIFO order within one producer and that drain empties
     * the queue in a single step.
     */
    #[test]
    fn test_fifo_and_drain_clears() {
        let queue = EventQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            queue.push(Event::slot(move || order.lock().unwrap().push(i)));
        }

        let batch = queue.drain();
        assert_eq!(batch.len(), 5);
        assert!(queue.drain().is_empty());

        for event in batch {
            match event.into_kind() {
                crate::event::EventKind::Slot(invoke) => invoke(),
                crate::event::EventKind::Stop { .. } => panic!("unexpected stop event"),
            }
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    /**
     * Verifies that a requeued remainder lands ahead of later pushes.
     */
    #[test]
    fn test_requeue_front_precedes_new_pushes() {
        let queue = EventQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let push_tagged = |tag: u32| {
            let order = Arc::clone(&order);
            Event::slot(move || order.lock().unwrap().push(tag))
        };

        queue.push(push_tagged(1));
        queue.push(push_tagged(2));
        let remainder = queue.drain();
        queue.push(push_tagged(3));
        queue.requeue_front(remainder);

        for event in queue.drain() {
            match event.into_kind() {
                crate::event::EventKind::Slot(invoke) => invoke(),
                crate::event::EventKind::Stop { .. } => panic!("unexpected stop event"),
            }
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    /**
     * Verifies that `wait_nonempty` wakes when the stop flag is raised
     * even though no event ever arrives.
     */
    #[test]
    fn test_wait_wakes_on_stop() {
        let queue = Arc::new(EventQueue::new());
        let stop = Arc::new(AtomicBool::new(false));
        let woke = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            let woke = Arc::clone(&woke);
            thread::spawn(move || {
                queue.wait_nonempty(&stop);
                woke.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(woke.load(Ordering::SeqCst), 0);

        stop.store(true, Ordering::SeqCst);
        queue.notify_all();
        waiter.join().expect("waiter panicked");
        assert_eq!(woke.load(Ordering::SeqCst), 1);
    }
}
