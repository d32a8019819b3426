/**
 * Connection bookkeeping for signals: the delivery mode, the
 * type-erased receiver binding, and the per-connection record.
 *
 * A connection stores a *weak* receiver reference. Every emit promotes
 * it afresh: success yields a `PromotedSlot` whose callable owns the
 * strong handle (pinning the receiver for the duration of a queued
 * delivery), failure marks the connection for pruning.
 */
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};

use crate::event_loop::EventLoop;
use crate::ident::Id;
use crate::object::Object;

// ---------------------------------------------------------------------------
// ConnectionType
// ---------------------------------------------------------------------------

/**
 * How a connected slot is invoked when the signal is emitted.
 *
 * The default is `Queued`: deliveries are deferred through the
 * receiver's event loop unless the connection explicitly opts into
 * synchronous or thread-sensitive behavior.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionType {
    /// Invoke synchronously on the emitting thread.
    Direct,

    /// Post the invocation onto the receiver's event loop.
    #[default]
    Queued,

    /**
     * Post onto the receiver's loop and block the emitter until the
     * slot has finished, normally or by exception. Downgrades to
     * `Direct` when the emitter *is* the receiver loop's running
     * thread (or the loop has no running consumer): blocking there
     * would deadlock the only thread able to drain the event.
     */
    BlockingQueued,

    /**
     * `Direct` if the emitting thread equals the receiver loop's
     * running thread, `Queued` otherwise. Resolved at each emit.
     */
    Auto,
}

// ---------------------------------------------------------------------------
// Slot erasure
// ---------------------------------------------------------------------------

/// A promoted receiver: its loop for routing plus a one-shot callable
/// that owns the strong handle.
pub(crate) struct PromotedSlot<Args> {
    pub(crate) event_loop: Option<Arc<EventLoop>>,
    pub(crate) invoke: Box<dyn FnOnce(Args) + Send>,
}

/// Type-erased receiver binding stored inside a connection.
pub(crate) trait SlotTarget<Args>: Send + Sync {
    /// Promote the weak receiver; `None` means it expired.
    fn promote(&self) -> Option<PromotedSlot<Args>>;
}

/// The one concrete binding: a weak receiver plus a slot callable.
pub(crate) struct ReceiverSlot<R, Args> {
    pub(crate) receiver: Weak<R>,
    pub(crate) slot: Arc<dyn Fn(&R, Args) + Send + Sync>,
}

impl<R, Args> SlotTarget<Args> for ReceiverSlot<R, Args>
where
    R: Object,
    Args: Send + 'static,
{
    fn promote(&self) -> Option<PromotedSlot<Args>> {
        let receiver = self.receiver.upgrade()?;
        let slot = Arc::clone(&self.slot);
        Some(PromotedSlot {
            event_loop: receiver.base().event_loop().cloned(),
            invoke: Box::new(move |args| slot(&receiver, args)),
        })
    }
}

// ---------------------------------------------------------------------------
// Connection record
// ---------------------------------------------------------------------------

pub(crate) struct Connection<Args> {
    pub(crate) id: Id,
    pub(crate) mode: ConnectionType,
    /// Raised by `disconnect`; re-checked by an in-progress emit right
    /// before delivery so a disconnected slot is never invoked after
    /// the disconnect call returns.
    pub(crate) disconnected: Arc<AtomicBool>,
    pub(crate) target: Arc<dyn SlotTarget<Args>>,
}

impl<Args> Clone for Connection<Args> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            mode: self.mode,
            disconnected: Arc::clone(&self.disconnected),
            target: Arc::clone(&self.target),
        }
    }
}
