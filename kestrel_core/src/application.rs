/**
 * Application: owns the primary event loop and orchestrates a
 * signal-driven, acknowledged shutdown.
 *
 * Shutdown protocol:
 * 1. Somebody emits `signal_start_cleanup`. Every registered
 *    participant runs its cleanup slot on its own loop and emits its
 *    finished signal, carrying its object id.
 * 2. Those finished signals feed `on_finished_cleanup`, which removes
 *    the participant from the registry. When the registry empties the
 *    application quits with return value 0.
 * 3. `quit` clears the keep-running flag and stops the primary loop;
 *    `run` observes the flag and returns the stored value.
 *
 * Participants may live on any loop — cleanup always executes with the
 * participant's own thread affinity. The application only counts
 * acknowledgments; it never touches participant state.
 */
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use crate::event_loop::EventLoop;
use crate::ident::Id;
use crate::object::{build, Object, ObjectBase};
use crate::signal::Signal;
use crate::sync::lock;

/// Pacing of the frame-driven primary loop poll in `run`.
const FRAME_PACE: Duration = Duration::from_millis(16);

struct RunState {
    keep_running: bool,
    return_value: i32,
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

pub struct Application {
    base: ObjectBase,
    primary_loop: Arc<EventLoop>,

    /// Emitted (by the embedding program) to begin the shutdown round.
    pub signal_start_cleanup: Signal<()>,

    /// Registered cleanup participants, held weakly with their ids.
    participants: Mutex<Vec<(Id, Weak<dyn Object>)>>,

    run_state: Mutex<RunState>,
}

impl Object for Application {
    fn base(&self) -> &ObjectBase {
        &self.base
    }
}

impl Application {
    /// Builds an application with a fresh primary loop.
    pub fn create() -> Arc<Application> {
        let primary_loop = Arc::new(EventLoop::new());
        build(Application {
            base: ObjectBase::new(Some(Arc::clone(&primary_loop))),
            primary_loop,
            signal_start_cleanup: Signal::new(),
            participants: Mutex::new(Vec::new()),
            run_state: Mutex::new(RunState {
                keep_running: false,
                return_value: 0,
            }),
        })
    }

    /// The primary event loop driven by `run`.
    pub fn event_loop(&self) -> &Arc<EventLoop> {
        &self.primary_loop
    }

    /**
     * Registers a cleanup participant. The registration is weak: a
     * participant that expires before acknowledging is swept out
     * opportunistically during `on_finished_cleanup`.
     */
    pub fn add_cleanup_request<T: Object>(&self, participant: &Arc<T>) {
        let participant: Arc<dyn Object> = participant.clone();
        let weak: Weak<dyn Object> = Arc::downgrade(&participant);
        lock(&self.participants).push((participant.base().id(), weak));
    }

    /// Number of participants still awaiting acknowledgment.
    pub fn cleanup_request_count(&self) -> usize {
        lock(&self.participants).len()
    }

    /**
     * Acknowledgment handler: connect each participant's finished
     * signal here. Removes the participant (and any expired entries);
     * an empty registry quits the application with value 0.
     */
    pub fn on_finished_cleanup(&self, id: Id) {
        let empty = {
            let mut participants = lock(&self.participants);
            participants.retain(|(pid, weak)| *pid != id && weak.strong_count() > 0);
            participants.is_empty()
        };
        if empty {
            self.quit(0);
        }
    }

    /**
     * Starts the primary loop and drives it with a frame-paced
     * `process_events` poll until `quit`. Returns the stored value.
     *
     * Polling (rather than a blocking `run` on the loop) keeps the
     * calling thread re-usable for a foreign control flow — the
     * drain and the pacing sleep interleave on this thread.
     */
    pub fn run(&self) -> i32 {
        self.primary_loop.start();
        lock(&self.run_state).keep_running = true;

        loop {
            if !lock(&self.run_state).keep_running {
                break;
            }
            self.primary_loop.process_events();
            thread::sleep(FRAME_PACE);
        }

        lock(&self.run_state).return_value
    }

    /**
     * Stores the return value, clears the keep-running flag, and stops
     * the primary loop. Safe from any thread; `run` returns on its
     * next observation of the flag.
     */
    pub fn quit(&self, return_value: i32) {
        {
            let mut run_state = lock(&self.run_state);
            run_state.keep_running = false;
            run_state.return_value = return_value;
        }
        self.primary_loop.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A participant that decrements a shared counter when told to
    /// clean up, then acknowledges with its id.
    struct CleanupParticipant {
        base: ObjectBase,
        remaining: Arc<AtomicU32>,
        signal_finished_cleanup: Signal<Id>,
    }

    impl CleanupParticipant {
        fn create(event_loop: Arc<EventLoop>, remaining: Arc<AtomicU32>) -> Arc<Self> {
            build(Self {
                base: ObjectBase::new(Some(event_loop)),
                remaining,
                signal_finished_cleanup: Signal::new(),
            })
        }

        fn on_cleanup(&self) {
            self.remaining.fetch_sub(1, Ordering::SeqCst);
            self.signal_finished_cleanup.emit(self.base.id());
        }
    }

    impl Object for CleanupParticipant {
        fn base(&self) -> &ObjectBase {
            &self.base
        }
    }

    /**
     * The full shutdown round: four participants split across the
     * primary loop and a worker loop, all acknowledging; run returns
     * once the registry is empty.
     */
    #[test]
    fn test_cleanup_round_terminates_run() {
        let app = Application::create();
        let remaining = Arc::new(AtomicU32::new(4));

        let alt_loop = Arc::new(EventLoop::new());
        let alt_handle =
            EventLoop::launch_in_thread(Arc::clone(&alt_loop)).expect("spawn failed");

        let participants = [
            CleanupParticipant::create(Arc::clone(app.event_loop()), Arc::clone(&remaining)),
            CleanupParticipant::create(Arc::clone(app.event_loop()), Arc::clone(&remaining)),
            CleanupParticipant::create(Arc::clone(&alt_loop), Arc::clone(&remaining)),
            CleanupParticipant::create(Arc::clone(&alt_loop), Arc::clone(&remaining)),
        ];

        for participant in &participants {
            app.add_cleanup_request(participant);
            app.signal_start_cleanup
                .connect(participant, |p, ()| p.on_cleanup());
            participant
                .signal_finished_cleanup
                .connect(&app, |a, id| a.on_finished_cleanup(id));
        }
        assert_eq!(app.cleanup_request_count(), 4);

        app.signal_start_cleanup.emit(());
        let return_value = app.run();

        EventLoop::remove_from_thread(&alt_loop, alt_handle, true);
        assert_eq!(return_value, 0);
        assert_eq!(remaining.load(Ordering::SeqCst), 0);
        assert_eq!(app.cleanup_request_count(), 0);
    }

    /// quit stores the return value run hands back.
    #[test]
    fn test_quit_return_value() {
        let app = Application::create();
        let quitter = {
            let app = Arc::clone(&app);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                app.quit(17);
            })
        };
        assert_eq!(app.run(), 17);
        quitter.join().expect("quitter panicked");
    }
}
