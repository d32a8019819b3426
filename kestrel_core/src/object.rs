/**
 * Objects: identity, thread affinity, and the two-phase builder.
 *
 * Every framework entity embeds an `ObjectBase`: a process-unique id,
 * the event loop the object is bound to (queued slot deliveries execute
 * there), and a type-erased weak self-reference.
 *
 * Construction is two-phase and goes through `build`, the only
 * sanctioned creation path:
 * 1. The type's ordinary constructor produces the value. No stable
 *    self-reference exists yet, so constructors must not register the
 *    object anywhere.
 * 2. `build` wraps the value in an `Arc`, installs the weak
 *    self-reference, and invokes the `Object::init` hook on the
 *    finished handle. Work that needs the handle — connecting the
 *    object's own methods to signals, posting to its loop — belongs in
 *    `init`.
 *
 * Ownership is shared: the `Arc` returned by `build` is the strong
 * handle; signals and registries hold weak references and detect expiry
 * on promotion.
 */
use std::any::Any;
use std::sync::{Arc, OnceLock, Weak};

use crate::event_loop::EventLoop;
use crate::ident::{self, Id};

// ---------------------------------------------------------------------------
// ObjectBase
// ---------------------------------------------------------------------------

/**
 * The per-object kernel state embedded in every framework entity.
 *
 * The bound event loop is fixed at construction and never changes.
 * Root objects (no loop) receive every signal delivery directly on the
 * emitting thread.
 */
pub struct ObjectBase {
    id: Id,
    event_loop: Option<Arc<EventLoop>>,
    self_ref: OnceLock<Weak<dyn Any + Send + Sync>>,
}

impl ObjectBase {
    pub fn new(event_loop: Option<Arc<EventLoop>>) -> Self {
        Self {
            id: ident::next_id(),
            event_loop,
            self_ref: OnceLock::new(),
        }
    }

    /// Process-unique identifier of this object.
    pub fn id(&self) -> Id {
        self.id
    }

    /// The loop this object's queued slots execute on, if any.
    pub fn event_loop(&self) -> Option<&Arc<EventLoop>> {
        self.event_loop.as_ref()
    }

    /**
     * Promotes the weak self-reference back to a typed strong handle.
     *
     * Returns `None` if the object was not created through `build`, if
     * every strong holder is gone, or if `T` is not the object's
     * concrete type.
     */
    pub fn strong_self<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let promoted = self.self_ref.get()?.upgrade()?;
        promoted.downcast::<T>().ok()
    }

    fn bind(&self, weak: Weak<dyn Any + Send + Sync>) {
        /* First bind wins; `build` is the only caller. */
        let _ = self.self_ref.set(weak);
    }
}

// ---------------------------------------------------------------------------
// Object trait & builder
// ---------------------------------------------------------------------------

/**
 * Implemented by every framework entity. `base` exposes the embedded
 * kernel state; `init` is the phase-two hook, invoked by `build` once a
 * stable strong handle exists.
 */
pub trait Object: Send + Sync + 'static {
    fn base(&self) -> &ObjectBase;

    /// Phase-two initialization. Runs on the `build` caller's thread
    /// with the weak self-reference already installed.
    fn init(self: &Arc<Self>)
    where
        Self: Sized,
    {
    }
}

/**
 * Builds an object: wraps the constructed value, installs its weak
 * self-reference, runs `init`, and returns the strong handle.
 */
pub fn build<T: Object>(value: T) -> Arc<T> {
    let strong = Arc::new(value);
    let dyn_strong: Arc<dyn Any + Send + Sync> = strong.clone();
    let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(&dyn_strong);
    strong.base().bind(weak);
    T::init(&strong);
    strong
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::lock;
    use std::sync::Mutex;

    struct Probe {
        base: ObjectBase,
        trace: Mutex<String>,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                base: ObjectBase::new(None),
                trace: Mutex::new(String::from("construct")),
            }
        }
    }

    impl Object for Probe {
        fn base(&self) -> &ObjectBase {
            &self.base
        }

        fn init(self: &Arc<Self>) {
            /* The handle must already be promotable in phase two. */
            assert!(self.base.strong_self::<Probe>().is_some());
            lock(&self.trace).push_str(" init");
        }
    }

    /// Constructor runs before init, and init sees a live self-reference.
    #[test]
    fn test_two_phase_order() {
        let probe = build(Probe::new());
        assert_eq!(*lock(&probe.trace), "construct init");
    }

    /// Each built object gets a distinct, non-invalid identifier.
    #[test]
    fn test_identity() {
        let a = build(Probe::new());
        let b = build(Probe::new());
        assert_ne!(a.base().id(), crate::ident::INVALID_ID);
        assert_ne!(a.base().id(), b.base().id());
    }

    /// strong_self promotes to the concrete type and respects expiry.
    #[test]
    fn test_strong_self_promotion() {
        let probe = build(Probe::new());
        let again = probe.base().strong_self::<Probe>().expect("self-reference");
        assert_eq!(again.base().id(), probe.base().id());

        /* Without the builder there is nothing to promote. */
        let raw = Probe::new();
        assert!(raw.base().strong_self::<Probe>().is_none());
    }
}
