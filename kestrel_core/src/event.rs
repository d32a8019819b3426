/**
 * The unit of deferred work that flows through an event loop.
 *
 * Two built-in shapes:
 * - A *slot event* carries a zero-argument callable captured at enqueue
 *   time. This is how queued signal deliveries, timer expiries, and any
 *   user-posted work travel to the loop's thread.
 * - A *stop event* asks the draining loop to leave its blocking run.
 *   Stop events are stamped with the loop's activation epoch at post
 *   time, so one that survives in the queue across a stop/start cycle
 *   does not halt the next activation.
 *
 * `Event` is opaque on purpose: user code builds slot events through
 * `Event::slot`, and only the owning loop builds stop events.
 */

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A typed unit of deferred work. See the module docs.
pub struct Event {
    kind: EventKind,
}

pub(crate) enum EventKind {
    /// Invoke the captured callable on the draining thread.
    Slot(Box<dyn FnOnce() + Send>),

    /// Halt the activation whose epoch matches; otherwise inert.
    Stop { epoch: u64 },
}

impl Event {
    /**
     * Wraps a callable as a slot event.
     *
     * The callable runs exactly once, on whichever thread drains the
     * queue it is posted to.
     */
    pub fn slot(invoke: impl FnOnce() + Send + 'static) -> Self {
        Self {
            kind: EventKind::Slot(Box::new(invoke)),
        }
    }

    pub(crate) fn stop(epoch: u64) -> Self {
        Self {
            kind: EventKind::Stop { epoch },
        }
    }

    pub(crate) fn into_kind(self) -> EventKind {
        self.kind
    }
}
