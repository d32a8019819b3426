/*!
 * Kestrel Timer — single-shot and periodic timeout sources bound to an
 * event loop.
 *
 * A `Timer` emits `signal_timeout` on its bound loop after an interval.
 * Arming happens in the *calling* thread, never by posting a "start"
 * event into the loop — a backed-up queue therefore cannot delay the
 * first wakeup. Each arm gets a generation number; wakeups from an
 * older arm are discarded, so rapid re-arming fires only the last arm.
 *
 * The scheduler is a named thread per arm. It sleeps on
 * `recv_timeout` over a cancellation channel: a timeout means the
 * interval elapsed and the expiry is posted to the bound loop; a
 * disconnect means the arm was cancelled (stop, re-arm, or drop) and
 * the thread exits without firing.
 */
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use kestrel_core::{build, Event, EventLoop, Object, ObjectBase, Signal};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

struct TimerInner {
    repeating: bool,
    active: bool,
    /// Dropping the sender disconnects the current scheduler thread.
    cancel: Option<Sender<()>>,
}

pub struct Timer {
    base: ObjectBase,

    /// Emitted on the bound loop each time the interval elapses.
    pub signal_timeout: Signal<()>,

    /// Bumped by every `start` and `stop`; wakeups carry the
    /// generation of their arm and are discarded when stale.
    generation: AtomicU64,

    inner: Mutex<TimerInner>,
}

impl Object for Timer {
    fn base(&self) -> &ObjectBase {
        &self.base
    }
}

impl Timer {
    /// Builds a timer bound to `event_loop`.
    pub fn create(event_loop: Arc<EventLoop>) -> Arc<Timer> {
        build(Timer {
            base: ObjectBase::new(Some(event_loop)),
            signal_timeout: Signal::new(),
            generation: AtomicU64::new(0),
            inner: Mutex::new(TimerInner {
                repeating: false,
                active: false,
                cancel: None,
            }),
        })
    }

    /**
     * Arms the timer: after `interval` (and every `interval` again if
     * `repeating`), `signal_timeout` is emitted on the bound loop.
     *
     * Arming is immediate and happens here, in the calling thread. A
     * previous arm is cancelled: its generation goes stale and its
     * scheduler thread is woken through the replaced cancellation
     * channel. Errors only if the scheduler thread cannot be spawned.
     */
    pub fn start(&self, interval: Duration, repeating: bool) -> Result<(), String> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        {
            let mut inner = lock(&self.inner);
            inner.repeating = repeating;
            inner.active = true;
            inner.cancel = Some(cancel_tx);
        }

        let Some(strong) = self.base.strong_self::<Timer>() else {
            return Err("Timer must be created through Timer::create".into());
        };
        let weak = Arc::downgrade(&strong);
        drop(strong);

        thread::Builder::new()
            .name("kestrel-timer".into())
            .spawn(move || Timer::schedule(weak, generation, interval, repeating, cancel_rx))
            .map(|_| ())
            .map_err(|e| format!("Failed to spawn timer thread: {e}"))
    }

    /**
     * Cancels the current arm, if any: marks the timer inactive,
     * invalidates in-flight wakeups, and wakes the scheduler thread so
     * it can exit early. Idempotent.
     */
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut inner = lock(&self.inner);
        inner.active = false;
        inner.cancel = None;
    }

    /// True from `start` until `stop`, drop, or a single-shot expiry.
    pub fn is_active(&self) -> bool {
        lock(&self.inner).active
    }

    // -----------------------------------------------------------------------
    // Scheduler
    // -----------------------------------------------------------------------

    /**
     * Body of the scheduler thread for one arm. Sleeps a full interval
     * per iteration; every expiry is posted to the bound loop as a slot
     * event that re-validates the generation on the loop's thread.
     */
    fn schedule(
        weak: Weak<Timer>,
        generation: u64,
        interval: Duration,
        repeating: bool,
        cancel: Receiver<()>,
    ) {
        loop {
            match cancel.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                /* Cancelled: the arm was stopped or replaced. */
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }

            let Some(timer) = weak.upgrade() else {
                return;
            };
            if timer.generation.load(Ordering::SeqCst) != generation {
                log::trace!("[Kestrel] discarding stale timer wakeup");
                return;
            }
            let Some(event_loop) = timer.base.event_loop() else {
                return;
            };

            let expired = Weak::clone(&weak);
            event_loop.post_event(Event::slot(move || {
                if let Some(timer) = expired.upgrade() {
                    timer.on_deadline(generation);
                }
            }));

            if !repeating {
                return;
            }
        }
    }

    /**
     * Runs on the loop thread when a posted expiry is drained. A stale
     * generation means the arm was cancelled after posting — drop it.
     * Single-shot timers go inactive *before* the emission, so slots
     * observing `is_active` during the timeout see the settled state.
     */
    fn on_deadline(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        {
            let mut inner = lock(&self.inner);
            if !inner.active {
                return;
            }
            if !inner.repeating {
                inner.active = false;
                inner.cancel = None;
            }
        }
        self.signal_timeout.emit(());
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Condvar, Mutex};
    use std::time::Instant;

    /// Blocks a test thread until a requested number of timeout
    /// signals have been observed on the loop thread.
    struct WakeupReceiver {
        base: ObjectBase,
        state: Mutex<WakeupState>,
        wakeups_done: Condvar,
    }

    struct WakeupState {
        waiting: bool,
        count: u32,
        limit: u32,
    }

    impl WakeupReceiver {
        fn create(event_loop: Arc<EventLoop>) -> Arc<Self> {
            build(Self {
                base: ObjectBase::new(Some(event_loop)),
                state: Mutex::new(WakeupState {
                    waiting: false,
                    count: 0,
                    limit: 0,
                }),
                wakeups_done: Condvar::new(),
            })
        }

        fn prepare(&self, limit: u32) {
            let mut state = lock(&self.state);
            state.waiting = true;
            state.count = 0;
            state.limit = limit;
        }

        fn block(&self) {
            let mut state = lock(&self.state);
            while state.waiting {
                state = self
                    .wakeups_done
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        fn on_wakeup(&self) {
            let mut state = lock(&self.state);
            state.count += 1;
            if state.count >= state.limit {
                state.waiting = false;
                self.wakeups_done.notify_all();
            }
        }

        fn on_sleep_for(&self, pause: Duration) {
            thread::sleep(pause);
        }
    }

    impl Object for WakeupReceiver {
        fn base(&self) -> &ObjectBase {
            &self.base
        }
    }

    fn launched_loop() -> (Arc<EventLoop>, thread::JoinHandle<()>) {
        let event_loop = Arc::new(EventLoop::new());
        let handle =
            EventLoop::launch_in_thread(Arc::clone(&event_loop)).expect("spawn failed");
        (event_loop, handle)
    }

    /**
     * Start/stop churn on a timer whose loop never runs must neither
     * hang nor leave the active flag wrong.
     */
    #[test]
    fn test_start_stop_fuzz_without_consumer() {
        let event_loop = Arc::new(EventLoop::new());
        let timer = Timer::create(Arc::clone(&event_loop));

        timer.stop();
        assert!(!timer.is_active());

        timer.start(Duration::from_millis(10), false).expect("arm failed");
        timer.start(Duration::from_millis(10), false).expect("arm failed");
        assert!(timer.is_active());
        timer.stop();
        timer.stop();
        assert!(!timer.is_active());
        timer.start(Duration::from_millis(10), false).expect("arm failed");
        timer.stop();
        assert!(!timer.is_active());
    }

    /**
     * Single-shot expiry: the interval is honored, and the timer is
     * inactive by the time the timeout is observable.
     */
    #[test]
    fn test_single_shot_interval_and_deactivation() {
        let (event_loop, handle) = launched_loop();
        let timer = Timer::create(Arc::clone(&event_loop));
        let receiver = WakeupReceiver::create(Arc::clone(&event_loop));
        timer.signal_timeout.connect(&receiver, |r, ()| r.on_wakeup());

        let begun = Instant::now();
        receiver.prepare(1);
        timer.start(Duration::from_millis(50), false).expect("arm failed");
        receiver.block();

        assert!(begun.elapsed() >= Duration::from_millis(50));
        assert!(!timer.is_active());

        EventLoop::remove_from_thread(&event_loop, handle, true);
    }

    /**
     * Sequential arms cancel each other; only the last arm fires, and
     * the elapsed time reflects *its* interval.
     */
    #[test]
    fn test_sequential_arms_fire_last_only() {
        let (event_loop, handle) = launched_loop();
        let timer = Timer::create(Arc::clone(&event_loop));
        let receiver = WakeupReceiver::create(Arc::clone(&event_loop));
        timer.signal_timeout.connect(&receiver, |r, ()| r.on_wakeup());

        let begun = Instant::now();
        receiver.prepare(1);
        timer.start(Duration::from_millis(50), false).expect("arm failed");
        timer.start(Duration::from_millis(60), false).expect("arm failed");
        timer.start(Duration::from_millis(70), false).expect("arm failed");
        receiver.block();

        assert!(begun.elapsed() >= Duration::from_millis(70));
        assert!(!timer.is_active());

        EventLoop::remove_from_thread(&event_loop, handle, true);
    }

    /**
     * A repeating timer fires every interval and stays active until
     * told otherwise.
     */
    #[test]
    fn test_repeating_stays_active() {
        let (event_loop, handle) = launched_loop();
        let timer = Timer::create(Arc::clone(&event_loop));
        let receiver = WakeupReceiver::create(Arc::clone(&event_loop));
        timer.signal_timeout.connect(&receiver, |r, ()| r.on_wakeup());

        let begun = Instant::now();
        receiver.prepare(3);
        timer.start(Duration::from_millis(33), true).expect("arm failed");
        receiver.block();

        assert!(begun.elapsed() >= Duration::from_millis(99));
        assert!(timer.is_active());

        timer.stop();
        EventLoop::remove_from_thread(&event_loop, handle, true);
    }

    /**
     * Arming is not deferred through the loop: a long event already in
     * flight must not delay the wakeup. With a 50 ms busy event and a
     * 50 ms timer, deferred arming would double the elapsed time.
     */
    #[test]
    fn test_arming_is_immediate_under_busy_loop() {
        let (event_loop, handle) = launched_loop();
        let timer = Timer::create(Arc::clone(&event_loop));
        let receiver = WakeupReceiver::create(Arc::clone(&event_loop));
        timer.signal_timeout.connect(&receiver, |r, ()| r.on_wakeup());

        let busy = Signal::<Duration>::new();
        busy.connect(&receiver, |r, pause| r.on_sleep_for(pause));

        let begun = Instant::now();
        busy.emit(Duration::from_millis(50));
        receiver.prepare(1);
        timer.start(Duration::from_millis(50), false).expect("arm failed");
        receiver.block();
        let elapsed = begun.elapsed();

        EventLoop::remove_from_thread(&event_loop, handle, true);

        assert!(elapsed >= Duration::from_millis(50));
        assert!(
            elapsed < Duration::from_millis(95),
            "wakeup was delayed by the busy event: {elapsed:?}"
        );
        assert!(!timer.is_active());
    }
}
