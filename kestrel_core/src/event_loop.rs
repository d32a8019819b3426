/**
 * The event loop: a restartable single-consumer drain over one queue.
 *
 * Lifecycle:
 *
 * ```text
 *            start()                stop() / drained stop event
 *  Inactive ────────► Active ──────────────────────────┐
 *      ▲                │                              │
 *      │                │ run() blocks, draining       ▼
 *      │                └───────────────────────► Stopping
 *      └──────────────────────────────────────────────┘
 *                    run unwinds (or no consumer was blocking)
 * ```
 *
 * `start` merely arms the loop. `run` is the blocking drain used inside
 * worker threads. `process_events` is a single-pass drain for callers
 * that integrate with a foreign control flow (a frame-paced application
 * loop, for instance). The same loop can be driven either way without
 * reconfiguration.
 *
 * Thread bookkeeping, two distinct notions:
 * - The *owner* thread is whichever thread most recently entered `run`
 *   or `process_events` during the current activation; `process_events`
 *   from any other thread fails without side effects.
 * - The *running* thread is the one currently inside a drain. Signal
 *   delivery compares against it to resolve `Auto` connections and to
 *   downgrade same-thread blocking-queued emits.
 *
 * Stopping never discards work: the drain re-checks the stop flag
 * before each event, and whatever remains of the batch goes back to the
 * head of the queue for the next activation. In-flight slots always run
 * to completion.
 */
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use crate::event::{Event, EventKind};
use crate::queue::EventQueue;
use crate::sync::lock;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of an event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Armed by nothing; posted events accumulate.
    Inactive,
    /// Armed; a consumer may drain.
    Active,
    /// A blocking `run` has been asked to leave and is unwinding.
    Stopping,
}

struct LoopInner {
    state: LoopState,
    /// Bumped by each `start`; stamped into stop events at post time.
    epoch: u64,
    /// Thread allowed to call `process_events` this activation.
    owner_thread: Option<ThreadId>,
    /// Thread currently inside `run` or `process_events`.
    running_thread: Option<ThreadId>,
    /// True while a blocking `run` is in progress.
    in_run: bool,
}

// ---------------------------------------------------------------------------
// EventLoop
// ---------------------------------------------------------------------------

pub struct EventLoop {
    queue: EventQueue,
    stop_requested: AtomicBool,
    inner: Mutex<LoopInner>,
    /// Signaled whenever the loop comes to rest; `wait` blocks on it.
    at_rest: Condvar,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            queue: EventQueue::new(),
            stop_requested: AtomicBool::new(false),
            inner: Mutex::new(LoopInner {
                state: LoopState::Inactive,
                epoch: 0,
                owner_thread: None,
                running_thread: None,
                in_run: false,
            }),
            at_rest: Condvar::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        lock(&self.inner).state
    }

    /**
     * Arms the loop: Inactive → Active.
     *
     * Idempotent while Active. Queued events are preserved across
     * stop/start cycles, so arming never disturbs pending work. Each
     * activation gets a fresh epoch; stop events stamped under an older
     * epoch become inert.
     */
    pub fn start(&self) {
        let mut inner = lock(&self.inner);
        if inner.state != LoopState::Inactive {
            return;
        }
        inner.state = LoopState::Active;
        inner.epoch += 1;
        inner.owner_thread = None;
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    /**
     * Asks the loop to halt. Non-blocking; safe from any thread.
     *
     * While Active: raises the stop flag and wakes the consumer. If a
     * blocking `run` is in progress it observes the flag, returns any
     * undrained remainder to the queue, and exits; otherwise the loop
     * comes to rest immediately. No-op in any other state.
     */
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        if inner.state != LoopState::Active {
            return;
        }
        self.halt_locked(&mut inner);
        drop(inner);
        self.queue.notify_all();
        self.at_rest.notify_all();
    }

    /**
     * Blocks the caller until the loop has come to rest (Inactive).
     * Safe from any thread; an immediate no-op if already Inactive.
     */
    pub fn wait(&self) {
        let mut inner = lock(&self.inner);
        while inner.state != LoopState::Inactive {
            inner = self
                .at_rest
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Posts an event from any thread. Delivery order is posting order.
    pub fn post_event(&self, event: Event) {
        self.queue.push(event);
    }

    /**
     * Enqueues a stop event stamped with the current activation epoch.
     *
     * Drained under a matching epoch it behaves like `stop()`, with
     * FIFO ordering relative to the poster's other events: "post A,
     * post stop, post B" runs A, halts, and keeps B for the next
     * activation. Drained under a later epoch it is a no-op, so a stop
     * event posted before `start` cannot kill the activation it never
     * belonged to.
     */
    pub fn post_stop_event(&self) {
        let epoch = lock(&self.inner).epoch;
        self.queue.push(Event::stop(epoch));
    }

    /**
     * The blocking drain. Returns immediately unless Active.
     *
     * Records the calling thread as owner and running thread, then
     * alternates between blocking on the queue and draining batches
     * until a stop is requested. State restoration (→ Inactive, clear
     * the running thread, wake `wait`ers) happens through a drop guard,
     * so a slot that panics unwinds through `run` without leaving the
     * loop wedged in Active.
     *
     * At most one thread may be inside the drain path of a loop;
     * entering `run` while another drain is in progress is a contract
     * violation and panics.
     */
    pub fn run(&self) {
        {
            let mut inner = lock(&self.inner);
            if inner.state != LoopState::Active {
                return;
            }
            assert!(
                inner.running_thread.is_none(),
                "EventLoop::run entered while another drain is in progress"
            );
            let me = thread::current().id();
            inner.in_run = true;
            inner.owner_thread = Some(me);
            inner.running_thread = Some(me);
        }

        let _exit = RunExit { event_loop: self };
        loop {
            self.queue.wait_nonempty(&self.stop_requested);
            if self.stop_requested.load(Ordering::SeqCst) {
                return;
            }
            if self.drain_batch(self.queue.drain()) {
                return;
            }
        }
    }

    /**
     * Non-blocking single-batch drain on the calling thread.
     *
     * Returns false without side effects unless the loop is Active, no
     * blocking `run` is in progress, and the caller is the activation's
     * owner thread (the first caller claims ownership). A successful
     * call records the caller as the running thread for its duration.
     */
    pub fn process_events(&self) -> bool {
        let me = thread::current().id();
        {
            let mut inner = lock(&self.inner);
            if inner.state != LoopState::Active
                || inner.in_run
                || inner.running_thread.is_some()
            {
                return false;
            }
            if matches!(inner.owner_thread, Some(owner) if owner != me) {
                return false;
            }
            inner.owner_thread = Some(me);
            inner.running_thread = Some(me);
        }

        let _exit = ProcessExit { event_loop: self };
        self.drain_batch(self.queue.drain());
        true
    }

    /// Thread currently inside a drain, if any. Read by signal delivery.
    pub(crate) fn running_thread(&self) -> Option<ThreadId> {
        lock(&self.inner).running_thread
    }

    // -----------------------------------------------------------------------
    // Drain machinery
    // -----------------------------------------------------------------------

    /**
     * Invokes a batch in order, re-checking the stop flag before each
     * event. Returns true if a stop interrupted the batch; whatever was
     * not consumed goes back to the head of the queue (also on unwind,
     * via the batch guard).
     */
    fn drain_batch(&self, batch: VecDeque<Event>) -> bool {
        let mut pending = PendingBatch {
            queue: &self.queue,
            events: batch,
        };
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                return true;
            }
            let Some(event) = pending.events.pop_front() else {
                return false;
            };
            match event.into_kind() {
                EventKind::Slot(invoke) => invoke(),
                EventKind::Stop { epoch } => self.halt_if_current(epoch),
            }
        }
    }

    /// A drained stop event halts only the activation it was posted into.
    fn halt_if_current(&self, epoch: u64) {
        let mut inner = lock(&self.inner);
        if inner.state != LoopState::Active || inner.epoch != epoch {
            return;
        }
        self.halt_locked(&mut inner);
        drop(inner);
        self.queue.notify_all();
        self.at_rest.notify_all();
    }

    fn halt_locked(&self, inner: &mut LoopInner) {
        self.stop_requested.store(true, Ordering::SeqCst);
        inner.state = if inner.in_run {
            LoopState::Stopping
        } else {
            LoopState::Inactive
        };
    }

    // -----------------------------------------------------------------------
    // Thread helpers
    // -----------------------------------------------------------------------

    /**
     * Starts the loop and spawns a named thread that runs it.
     *
     * The thread body is wrapped in `catch_unwind`: a slot panic has
     * already unwound through `run` (restoring the loop's state on the
     * way), so all that is left here is to report it instead of letting
     * the thread die silently.
     */
    pub fn launch_in_thread(event_loop: Arc<EventLoop>) -> Result<JoinHandle<()>, String> {
        event_loop.start();
        thread::Builder::new()
            .name("kestrel-loop".into())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| event_loop.run()));
                if result.is_err() {
                    log::error!("[Kestrel] event loop thread panicked while draining");
                }
            })
            .map_err(|e| format!("Failed to spawn event loop thread: {e}"))
    }

    /**
     * Posts a stop event, optionally waits for the loop to come to
     * rest, and joins the thread previously created by
     * `launch_in_thread`.
     */
    pub fn remove_from_thread(event_loop: &Arc<EventLoop>, handle: JoinHandle<()>, wait_drain: bool) {
        event_loop.post_stop_event();
        if wait_drain {
            event_loop.wait();
        }
        if handle.join().is_err() {
            log::error!("[Kestrel] event loop thread terminated by panic");
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Restores rest state when `run` exits, normally or by unwind.
struct RunExit<'a> {
    event_loop: &'a EventLoop,
}

impl Drop for RunExit<'_> {
    fn drop(&mut self) {
        let mut inner = lock(&self.event_loop.inner);
        inner.in_run = false;
        inner.running_thread = None;
        inner.state = LoopState::Inactive;
        drop(inner);
        self.event_loop.at_rest.notify_all();
    }
}

/// Clears the running-thread record when `process_events` exits.
struct ProcessExit<'a> {
    event_loop: &'a EventLoop,
}

impl Drop for ProcessExit<'_> {
    fn drop(&mut self) {
        lock(&self.event_loop.inner).running_thread = None;
    }
}

/// Returns an unconsumed batch remainder to the queue on scope exit.
struct PendingBatch<'a> {
    queue: &'a EventQueue,
    events: VecDeque<Event>,
}

impl Drop for PendingBatch<'_> {
    fn drop(&mut self) {
        if !self.events.is_empty() {
            self.queue.requeue_front(std::mem::take(&mut self.events));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
