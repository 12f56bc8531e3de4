//! The applier bound to the current worker thread.
//!
//! A worker binds its locality's applier once, when it first runs work, and
//! clears the binding on shutdown. The free functions in [`crate::register`]
//! go through this binding and fail with
//! [`ApplierError::RuntimeUnavailable`](crate::ApplierError) when it is absent.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, info};

use crate::applier::Applier;
use crate::naming::LocalityId;

thread_local! {
    static CURRENT: RefCell<Option<Arc<Applier>>> = const { RefCell::new(None) };
}

impl Applier {
    /// Bind this applier to the calling thread.
    ///
    /// Returns `true` if it was bound now. If any applier is already bound,
    /// the existing binding is kept and `false` is returned.
    pub fn bind_to_context(self: &Arc<Self>) -> bool {
        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            if current.is_some() {
                return false;
            }
            *current = Some(Arc::clone(self));
            info!(locality = %self.locality_id(), "applier bound to thread");
            true
        })
    }

    /// Bind for the lifetime of the returned guard. If another applier was
    /// already bound, the guard leaves it in place.
    pub fn bind_scoped(self: &Arc<Self>) -> ContextGuard {
        ContextGuard {
            bound: self.bind_to_context(),
            _not_send: PhantomData,
        }
    }

    /// Clear the calling thread's binding, returning what was bound.
    pub fn unbind_context() -> Option<Arc<Applier>> {
        let previous = CURRENT.with(|current| current.borrow_mut().take());
        if let Some(applier) = &previous {
            info!(locality = %applier.locality_id(), "applier unbound from thread");
        }
        previous
    }

    /// The applier bound to the calling thread, if any.
    pub fn current() -> Option<Arc<Applier>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Whether this applier is the one bound to the calling thread.
    pub fn is_current(self: &Arc<Self>) -> bool {
        CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .is_some_and(|bound| Arc::ptr_eq(bound, self))
        })
    }
}

/// Unbinds on drop, if it did the binding.
pub struct ContextGuard {
    bound: bool,
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    pub fn did_bind(&self) -> bool {
        self.bound
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if self.bound {
            debug!("context guard released");
            Applier::unbind_context();
        }
    }
}

/// The bound applier.
///
/// # Panics
///
/// Panics when no applier is bound. Use only where initialization is
/// already guaranteed; otherwise call [`current_applier_or_none`].
pub fn current_applier() -> Arc<Applier> {
    match Applier::current() {
        Some(applier) => applier,
        None => panic!("no applier is bound to this thread"),
    }
}

pub fn current_applier_or_none() -> Option<Arc<Applier>> {
    Applier::current()
}

/// Locality of the bound applier, if any.
pub fn current_locality_id() -> Option<LocalityId> {
    CURRENT.with(|current| current.borrow().as_ref().map(|a| a.locality_id()))
}
