/**
 * Signals: typed many-to-many dispatch with four delivery modes.
 *
 * A `Signal<Args>` is a free value — it belongs to no object and may
 * live as a local, a field, or a global. Receivers connect methods to
 * it; emitting traverses the connections in insertion order and
 * delivers according to each connection's `ConnectionType`:
 *
 * - `Direct`: synchronously on the emitting thread.
 * - `Queued` (the default): posted onto the receiver's event loop; the
 *   posted event owns a promoted strong handle, so the receiver cannot
 *   expire mid-delivery. Deliveries posted by one thread arrive in
 *   post order.
 * - `BlockingQueued`: queued, plus the emitter waits on a completion
 *   gate until the slot has finished. Same-thread emission downgrades
 *   to direct delivery — the callee runs to completion before the
 *   caller's post-emit statements, never deadlocking the drain.
 * - `Auto`: direct when the emitter is the receiver loop's running
 *   thread, queued otherwise; resolved at each emit.
 *
 * Emission works on a snapshot of the connection list, so slots may
 * freely connect and disconnect — including on this very signal —
 * while an emit is in flight. Receivers that expired are pruned after
 * the traversal; slots never run under a framework lock.
 *
 * # Module structure
 *
 * - `connection` — delivery modes, the erased receiver binding
 * - `gate` — the completion gate for blocking-queued emits
 */
mod connection;
mod gate;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::event::Event;
use crate::ident::{self, Id};
use crate::object::Object;
use crate::sync::lock;

use connection::{Connection, PromotedSlot, ReceiverSlot, SlotTarget};
use gate::{CompletionGate, NotifyOnDrop};

pub use connection::ConnectionType;

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/**
 * A typed fan-out point. `Args` is the argument payload of one
 * emission; use a tuple (or `()`) for multiple (or zero) arguments.
 */
pub struct Signal<Args> {
    connections: Mutex<Vec<Connection<Args>>>,
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
        }
    }

    /**
     * Connects a receiver method with the default (`Queued`) delivery
     * mode. Returns the connection's identifier.
     */
    pub fn connect<R, F>(&self, receiver: &Arc<R>, slot: F) -> Id
    where
        R: Object,
        F: Fn(&R, Args) + Send + Sync + 'static,
    {
        self.connect_with_type(receiver, slot, ConnectionType::default())
    }

    /**
     * Connects a receiver method with an explicit delivery mode.
     *
     * The connection holds the receiver weakly: it neither extends the
     * receiver's life nor outlives it (expired connections are pruned
     * on the next emit). Connection order is preserved; emits traverse
     * in the order `connect` calls succeeded.
     */
    pub fn connect_with_type<R, F>(&self, receiver: &Arc<R>, slot: F, mode: ConnectionType) -> Id
    where
        R: Object,
        F: Fn(&R, Args) + Send + Sync + 'static,
    {
        let slot: Arc<dyn Fn(&R, Args) + Send + Sync> = Arc::new(slot);
        let target: Arc<dyn SlotTarget<Args>> = Arc::new(ReceiverSlot {
            receiver: Arc::downgrade(receiver),
            slot,
        });
        let id = ident::next_id();
        lock(&self.connections).push(Connection {
            id,
            mode,
            disconnected: Arc::new(AtomicBool::new(false)),
            target,
        });
        id
    }

    /**
     * Removes a connection. Returns false for an unknown or already
     * removed id. A connection removed while an emit is traversing its
     * snapshot is not invoked after this call returns.
     */
    pub fn disconnect(&self, id: Id) -> bool {
        let mut connections = lock(&self.connections);
        let Some(index) = connections.iter().position(|c| c.id == id) else {
            return false;
        };
        let connection = connections.remove(index);
        connection.disconnected.store(true, Ordering::SeqCst);
        true
    }

    /// Presence check only; does not probe the receiver's liveness.
    pub fn connection_valid(&self, id: Id) -> bool {
        lock(&self.connections).iter().any(|c| c.id == id)
    }

    /**
     * Emits to every connection in insertion order.
     *
     * Per connection: promote the weak receiver (expired ones are
     * marked and pruned after the traversal), resolve the effective
     * mode, deliver. The connection lock is held only to snapshot and
     * to prune — never while a slot runs.
     */
    pub fn emit(&self, args: Args) {
        let snapshot: Vec<Connection<Args>> = lock(&self.connections).clone();
        let mut expired: Vec<Id> = Vec::new();

        for connection in snapshot {
            if connection.disconnected.load(Ordering::SeqCst) {
                continue;
            }
            match connection.target.promote() {
                Some(promoted) => deliver(connection.mode, promoted, args.clone()),
                None => expired.push(connection.id),
            }
        }

        if !expired.is_empty() {
            lock(&self.connections).retain(|c| !expired.contains(&c.id));
        }
    }
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

fn deliver<Args: Clone + Send + 'static>(
    mode: ConnectionType,
    promoted: PromotedSlot<Args>,
    args: Args,
) {
    let PromotedSlot { event_loop, invoke } = promoted;

    /* Root receivers have no loop to defer into. */
    let Some(event_loop) = event_loop else {
        invoke(args);
        return;
    };

    let me = thread::current().id();
    match mode {
        ConnectionType::Direct => invoke(args),

        ConnectionType::Queued => {
            event_loop.post_event(Event::slot(move || invoke(args)));
        }

        ConnectionType::Auto => {
            if event_loop.running_thread() == Some(me) {
                invoke(args);
            } else {
                event_loop.post_event(Event::slot(move || invoke(args)));
            }
        }

        ConnectionType::BlockingQueued => match event_loop.running_thread() {
            Some(consumer) if consumer != me => {
                let gate = Arc::new(CompletionGate::new());
                let notify = NotifyOnDrop(Arc::clone(&gate));
                event_loop.post_event(Event::slot(move || {
                    /* Dropped on every exit path, releasing the emitter
                     * even when the slot unwinds. */
                    let _notify = notify;
                    invoke(args);
                }));
                gate.wait();
            }
            /* Emitter is the consumer (or there is none): blocking on
             * the gate would starve the only thread able to drain the
             * event. Deliver in-line instead. */
            _ => invoke(args),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
