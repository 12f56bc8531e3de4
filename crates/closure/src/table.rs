use std::any;
use std::marker::PhantomData;

use crate::callable::Callable;
use crate::storage::Slot;

/// Diagnostic raised when an empty closure is invoked.
pub(crate) const EMPTY_INVOKE: &str = "invoked an empty task closure; check `is_empty()` before calling";

/// Per-type operations over a closure's [`Slot`].
///
/// One table exists per concrete callable type and signature, created by the
/// [`registry`](crate::registry) and shared by every closure holding that
/// type. Tables never change after creation; comparing table references is
/// how a closure tells which concrete type it holds.
///
/// Moving a callable between slots is a plain bitwise move in Rust, so tables
/// carry no move operation.
pub trait OperationTable<Args, R>: Send + Sync + 'static {
    /// Call the stored callable.
    ///
    /// # Safety
    ///
    /// `slot` must have been filled with this table's callable type.
    unsafe fn invoke(&self, slot: &mut Slot, args: Args) -> R;

    /// Drop the stored callable in place without releasing its storage.
    ///
    /// # Safety
    ///
    /// `slot` must hold a live value of this table's callable type.
    unsafe fn destruct(&self, slot: &mut Slot);

    /// Release a boxed slot's heap block without dropping its contents and
    /// leave the slot [`Slot::Empty`]. Inline slots are simply cleared.
    ///
    /// # Safety
    ///
    /// `slot` must have been filled with this table's callable type and its
    /// value must already be destructed.
    unsafe fn deallocate(&self, slot: &mut Slot);

    /// `true` only for the canonical empty table of a signature.
    fn is_canonical_empty(&self) -> bool;

    /// Name of the concrete callable type, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Destruct then deallocate.
    ///
    /// # Safety
    ///
    /// Same as [`OperationTable::destruct`].
    unsafe fn destroy(&self, slot: &mut Slot) {
        self.destruct(slot);
        self.deallocate(slot);
    }
}

// ── Concrete callable table ─────────────────────────────────────────

/// Table for callables of concrete type `F`.
///
/// Carries the type name so every table is a distinct, non-zero-sized
/// allocation with its own address.
pub(crate) struct CallableTable<F> {
    type_name: &'static str,
    _callable: PhantomData<fn() -> F>,
}

impl<F> CallableTable<F> {
    pub(crate) fn new() -> Self {
        Self {
            type_name: any::type_name::<F>(),
            _callable: PhantomData,
        }
    }
}

impl<F, Args, R> OperationTable<Args, R> for CallableTable<F>
where
    F: Callable<Args, R>,
    Args: 'static,
    R: 'static,
{
    unsafe fn invoke(&self, slot: &mut Slot, args: Args) -> R {
        match slot.value_ptr::<F>() {
            Some(callable) => (*callable).call(args),
            None => panic!("{EMPTY_INVOKE}"),
        }
    }

    unsafe fn destruct(&self, slot: &mut Slot) {
        if let Some(callable) = slot.value_ptr::<F>() {
            std::ptr::drop_in_place(callable);
        }
    }

    unsafe fn deallocate(&self, slot: &mut Slot) {
        if let Slot::Boxed(block) = *slot {
            // `MaybeUninit` frees the block with `F`'s layout but drops nothing.
            drop(Box::from_raw(block.as_ptr().cast::<std::mem::MaybeUninit<F>>()));
        }
        *slot = Slot::Empty;
    }

    fn is_canonical_empty(&self) -> bool {
        false
    }

    fn type_name(&self) -> &'static str {
        self.type_name
    }
}

// ── Canonical empty table ───────────────────────────────────────────

/// The table bound to closures that hold nothing.
pub(crate) struct EmptyTable {
    signature: &'static str,
}

impl EmptyTable {
    pub(crate) fn new<Args, R>() -> Self {
        Self {
            signature: any::type_name::<fn(Args) -> R>(),
        }
    }
}

impl<Args: 'static, R: 'static> OperationTable<Args, R> for EmptyTable {
    unsafe fn invoke(&self, _slot: &mut Slot, _args: Args) -> R {
        panic!("{EMPTY_INVOKE}")
    }

    unsafe fn destruct(&self, _slot: &mut Slot) {}

    unsafe fn deallocate(&self, slot: &mut Slot) {
        *slot = Slot::Empty;
    }

    fn is_canonical_empty(&self) -> bool {
        true
    }

    fn type_name(&self) -> &'static str {
        self.signature
    }
}
