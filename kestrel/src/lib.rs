/**
 * Kestrel — a concurrency toolkit for object-oriented programs.
 *
 * This is the main crate users should depend on. It re-exports the
 * kernel (`kestrel_core`) and the timer addon (`kestrel_timer`):
 * per-thread event loops, thread-affine objects, typed signals with
 * four delivery modes, loop-bound timers, and an application lifecycle
 * with acknowledged shutdown.
 *
 * # Quick start
 *
 * ```no_run
 * use std::sync::Arc;
 * use kestrel::{build, EventLoop, Object, ObjectBase, Signal};
 *
 * struct Printer {
 *     base: ObjectBase,
 * }
 *
 * impl Object for Printer {
 *     fn base(&self) -> &ObjectBase {
 *         &self.base
 *     }
 * }
 *
 * fn main() -> Result<(), String> {
 *     // A loop draining in its own thread.
 *     let event_loop = Arc::new(EventLoop::new());
 *     let worker = EventLoop::launch_in_thread(Arc::clone(&event_loop))?;
 *
 *     // An object whose queued slots execute on that loop.
 *     let printer = build(Printer {
 *         base: ObjectBase::new(Some(Arc::clone(&event_loop))),
 *     });
 *
 *     // A free-standing signal; the default delivery mode is Queued.
 *     let greeting = Signal::<String>::new();
 *     greeting.connect(&printer, |_printer, text| println!("{text}"));
 *     greeting.emit("hello from the loop thread".into());
 *
 *     EventLoop::remove_from_thread(&event_loop, worker, true);
 *     Ok(())
 * }
 * ```
 */

// ---------------------------------------------------------------------------
// Re-exports — the public surface area
// ---------------------------------------------------------------------------

pub use kestrel_core::{
    build, next_id, Application, ConnectionType, Event, EventLoop, Id, LoopState, Object,
    ObjectBase, Signal, INVALID_ID,
};
pub use kestrel_timer::Timer;
