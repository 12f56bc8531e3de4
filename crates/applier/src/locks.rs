//! Per-thread registry of held locks.
//!
//! Every unit of work dispatched through the applier is wrapped so that,
//! once its callable returns, the worker thread must hold no registered
//! locks. Locks register themselves on acquire and deregister on release;
//! [`TrackedMutex`] does this automatically through its guard.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{error, trace};

use crate::error::ApplierError;

thread_local! {
    static HELD: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
    static IGNORE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Record that the calling thread acquired the lock identified by `key`.
/// Re-entrant acquisitions are counted.
pub fn register_lock(key: usize) {
    if IGNORE_DEPTH.with(Cell::get) > 0 {
        return;
    }
    HELD.with(|held| *held.borrow_mut().entry(key).or_insert(0) += 1);
    trace!(lock = key, "lock registered");
}

/// Record that the calling thread released the lock identified by `key`.
/// Unknown keys are ignored.
pub fn unregister_lock(key: usize) {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        if let Some(count) = held.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                held.remove(&key);
            }
        }
    });
}

/// Number of lock acquisitions currently registered on this thread.
pub fn held_locks() -> usize {
    HELD.with(|held| held.borrow().values().sum())
}

/// Succeeds iff the calling thread holds no registered locks.
pub fn verify_no_locks(task: &str) -> Result<(), ApplierError> {
    match held_locks() {
        0 => Ok(()),
        count => Err(ApplierError::LockLeakDetected {
            task: task.to_string(),
            count,
        }),
    }
}

/// Fatal check run after every wrapped unit of work.
///
/// # Panics
///
/// Panics with the lock-leak diagnostic if any registered lock is still held.
pub(crate) fn force_error_on_lock(task: &str) {
    if let Err(leak) = verify_no_locks(task) {
        error!(task, held = held_locks(), "unit of work returned while holding locks");
        // The worker's lock state is unrecoverable past this point.
        HELD.with(|held| held.borrow_mut().clear());
        panic!("{leak}");
    }
}

// ── Guards ──────────────────────────────────────────────────────────

/// While alive, acquisitions on this thread are not registered.
pub struct IgnoreLocks {
    _not_send: PhantomData<*const ()>,
}

impl IgnoreLocks {
    pub fn new() -> Self {
        IGNORE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Default for IgnoreLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IgnoreLocks {
    fn drop(&mut self) {
        IGNORE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Registers `key` on construction and deregisters it on drop.
/// Bound to the thread that created it.
pub struct LockRegistration {
    key: usize,
    registered: bool,
    _not_send: PhantomData<*const ()>,
}

impl LockRegistration {
    pub fn new(key: usize) -> Self {
        let registered = IGNORE_DEPTH.with(Cell::get) == 0;
        register_lock(key);
        Self {
            key,
            registered,
            _not_send: PhantomData,
        }
    }
}

impl Drop for LockRegistration {
    fn drop(&mut self) {
        if self.registered {
            unregister_lock(self.key);
        }
    }
}

// ── TrackedMutex ────────────────────────────────────────────────────

/// A mutex whose guard is visible to the lock-leak check.
#[derive(Debug, Default)]
pub struct TrackedMutex<T> {
    inner: Mutex<T>,
}

impl<T> TrackedMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    /// Acquire the lock. A poisoned mutex is recovered, not propagated.
    pub fn lock(&self) -> TrackedGuard<'_, T> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        TrackedGuard {
            guard,
            _registration: LockRegistration::new(self.key()),
        }
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct TrackedGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    _registration: LockRegistration,
}

impl<T> Deref for TrackedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for TrackedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
