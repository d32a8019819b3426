/*!
 * Kestrel Core — the concurrency kernel.
 *
 * Per-thread event loops, thread-affine objects, typed signals with
 * four delivery modes, and an application lifecycle with acknowledged
 * shutdown. Timers live in the `kestrel_timer` addon; end users should
 * depend on the `kestrel` facade crate, which re-exports everything.
 *
 * # Module structure
 *
 * - `ident` — process-wide identifier generator
 * - `event` / `queue` — the unit of deferred work and its FIFO
 * - `event_loop` — the Inactive/Active/Stopping drain state machine
 * - `object` — identity, thread affinity, the two-phase builder
 * - `signal/` — many-to-many dispatch: Direct, Queued, BlockingQueued, Auto
 * - `application` — primary loop plus the cleanup shutdown protocol
 */

mod application;
mod event;
mod event_loop;
mod ident;
mod object;
mod queue;
mod signal;
mod sync;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use application::Application;
pub use event::Event;
pub use event_loop::{EventLoop, LoopState};
pub use ident::{next_id, Id, INVALID_ID};
pub use object::{build, Object, ObjectBase};
pub use signal::{ConnectionType, Signal};
