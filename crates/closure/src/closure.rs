use std::fmt;
use std::mem;

use crate::callable::Callable;
use crate::error::ClosureError;
use crate::registry;
use crate::storage::Slot;
use crate::table::OperationTable;

/// A move-only, type-erased callable with signature `Args -> R`.
///
/// `Args` is a tuple of up to eight argument types; see [`Callable`]. The
/// closure owns its callable exclusively: it cannot be cloned, and moving it
/// (or [`TaskClosure::take`]) transfers the table reference and the slot.
///
/// Storage is in exactly one of three states: empty, inline (the callable's
/// bytes live in the closure, for callables no larger than a pointer), or
/// boxed. The bound [`OperationTable`] is always the one for the type in the
/// slot, or the canonical empty table when the slot is empty.
///
/// ```
/// use tandem_closure::TaskClosure;
///
/// let mut add: TaskClosure<(u32, u32), u32> = TaskClosure::new(|a: u32, b: u32| a + b);
/// assert_eq!(add.invoke((2, 3)), 5);
/// ```
pub struct TaskClosure<Args: 'static, R: 'static = ()> {
    table: &'static dyn OperationTable<Args, R>,
    slot: Slot,
}

// SAFETY: every callable stored in a slot is `Send` (a `Callable` bound), and
// the slot is only reachable through the owning closure.
unsafe impl<Args: 'static, R: 'static> Send for TaskClosure<Args, R> {}

impl<Args: 'static, R: 'static> TaskClosure<Args, R> {
    /// Wrap `callable`, storing it inline when it fits.
    pub fn new<F>(callable: F) -> Self
    where
        F: Callable<Args, R>,
    {
        Self {
            table: registry::table_for::<F, Args, R>(),
            slot: Slot::new(callable),
        }
    }

    /// A closure holding nothing, bound to the signature's empty table.
    pub fn none() -> Self {
        Self {
            table: registry::empty_table::<Args, R>(),
            slot: Slot::Empty,
        }
    }

    /// Wrap an optional callable. `None` is the empty callable: it yields an
    /// empty closure whatever `F` is.
    pub fn from_option<F>(callable: Option<F>) -> Self
    where
        F: Callable<Args, R>,
    {
        match callable {
            Some(callable) => Self::new(callable),
            None => Self::none(),
        }
    }

    /// `true` iff nothing is stored and the canonical empty table is bound.
    pub fn is_empty(&self) -> bool {
        self.slot.is_empty() && self.table.is_canonical_empty()
    }

    /// Call the held callable. Results and panics pass through unchanged.
    ///
    /// # Panics
    ///
    /// Invoking an empty closure is a caller bug and always panics. Check
    /// [`TaskClosure::is_empty`] first or use [`TaskClosure::try_invoke`].
    pub fn invoke(&mut self, args: Args) -> R {
        // SAFETY: the bound table always matches the slot's contents.
        unsafe { self.table.invoke(&mut self.slot, args) }
    }

    /// Like [`TaskClosure::invoke`], but reports an empty closure as an error.
    pub fn try_invoke(&mut self, args: Args) -> Result<R, ClosureError> {
        if self.is_empty() {
            return Err(ClosureError::Empty);
        }
        Ok(self.invoke(args))
    }

    /// Call the held callable once and release it, even if the call panics.
    ///
    /// # Panics
    ///
    /// Panics if the closure is empty.
    pub fn invoke_once(mut self, args: Args) -> R {
        self.invoke(args)
    }

    /// Replace the held callable with `callable`.
    ///
    /// When `callable` has the same concrete type as the value held now, its
    /// storage is reused: the old value is dropped in place and the new one
    /// is written over it, with no allocation and no change of table. In every
    /// other case the old value is fully released before the new one is
    /// stored.
    pub fn assign<F>(&mut self, callable: F)
    where
        F: Callable<Args, R>,
    {
        let table = registry::table_for::<F, Args, R>();

        if registry::same_table(self.table, table) && !self.is_empty() {
            // Identical table means identical layout, so the slot fits `F`.
            // Detach first so a panicking drop leaves `self` empty, not torn.
            let mut slot = mem::replace(&mut self.slot, Slot::Empty);
            let bound = mem::replace(&mut self.table, registry::empty_table::<Args, R>());
            // SAFETY: `slot` holds a live `F`, as `bound` is `F`'s table.
            unsafe {
                bound.destruct(&mut slot);
                slot.rebuild(callable);
            }
            self.slot = slot;
            self.table = bound;
        } else {
            self.reset();
            self.slot = Slot::new(callable);
            self.table = table;
        }
    }

    /// Drop and release the held callable, leaving the closure empty.
    pub fn reset(&mut self) {
        let mut slot = mem::replace(&mut self.slot, Slot::Empty);
        let table = mem::replace(&mut self.table, registry::empty_table::<Args, R>());
        // SAFETY: `table` was bound to `slot` until the line above.
        unsafe { table.destroy(&mut slot) };
    }

    /// Move the callable out, leaving this closure empty.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Exchange table and slot with `other`. Never touches the callables.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.table, &mut other.table);
        mem::swap(&mut self.slot, &mut other.slot);
    }

    /// Whether the held callable is of concrete type `F`, by table identity.
    pub fn holds<F>(&self) -> bool
    where
        F: Callable<Args, R>,
    {
        registry::same_table(self.table, registry::table_for::<F, Args, R>())
    }

    /// The bound operation table.
    pub fn table(&self) -> &'static dyn OperationTable<Args, R> {
        self.table
    }

    /// Type name of the held callable, or `None` when empty.
    pub fn held_type_name(&self) -> Option<&'static str> {
        if self.is_empty() {
            None
        } else {
            Some(self.table.type_name())
        }
    }

    pub fn is_inline(&self) -> bool {
        self.slot.is_inline()
    }

    pub fn is_boxed(&self) -> bool {
        self.slot.is_boxed()
    }
}

impl<Args: 'static, R: 'static> Default for TaskClosure<Args, R> {
    fn default() -> Self {
        Self::none()
    }
}

impl<Args: 'static, R: 'static> Drop for TaskClosure<Args, R> {
    fn drop(&mut self) {
        // SAFETY: the bound table always matches the slot's contents.
        unsafe { self.table.destroy(&mut self.slot) };
    }
}

impl<Args: 'static, R: 'static, F> From<Option<F>> for TaskClosure<Args, R>
where
    F: Callable<Args, R>,
{
    fn from(callable: Option<F>) -> Self {
        Self::from_option(callable)
    }
}

impl<Args: 'static, R: 'static> fmt::Debug for TaskClosure<Args, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = match self.slot {
            Slot::Empty => "empty",
            Slot::Inline(_) => "inline",
            Slot::Boxed(_) => "boxed",
        };
        f.debug_struct("TaskClosure")
            .field("callable", &self.table.type_name())
            .field("storage", &storage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct Tracked {
        drops: Arc<AtomicUsize>,
        value: u64,
        _pad: [u64; 3],
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked(drops: &Arc<AtomicUsize>, value: u64) -> impl FnMut() -> u64 + Send + 'static {
        let held = Tracked {
            drops: Arc::clone(drops),
            value,
            _pad: [0; 3],
        };
        move || held.value
    }

    #[test]
    fn default_is_empty() {
        let c: TaskClosure<()> = TaskClosure::default();
        assert!(c.is_empty());
        assert!(c.table().is_canonical_empty());
        assert_eq!(c.held_type_name(), None);
    }

    #[test]
    fn none_option_builds_empty_closure() {
        let c: TaskClosure<(u32,), u32> = TaskClosure::from_option(None::<fn(u32) -> u32>);
        assert!(c.is_empty());

        let d: TaskClosure<(u32,), u32> = Some((|x: u32| x + 1) as fn(u32) -> u32).into();
        assert!(!d.is_empty());
    }

    #[test]
    fn zero_sized_callable_is_inline_and_not_empty() {
        let mut c: TaskClosure<(), u8> = TaskClosure::new(|| 9u8);
        assert!(c.is_inline());
        assert!(!c.is_empty());
        assert_eq!(c.invoke(()), 9);
    }

    #[test]
    fn large_callable_is_boxed() {
        let data = [1u64, 2, 3, 4];
        let mut c: TaskClosure<(), u64> = TaskClosure::new(move || data.iter().sum::<u64>());
        assert!(c.is_boxed());
        assert_eq!(c.invoke(()), 10);
    }

    #[test]
    fn take_leaves_source_empty() {
        let mut c: TaskClosure<(u32,), u32> = TaskClosure::new(|x: u32| x * 3);
        let mut d = c.take();
        assert!(c.is_empty());
        assert_eq!(d.invoke((4,)), 12);
    }

    #[test]
    fn drop_releases_value_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let c: TaskClosure<(), u64> = TaskClosure::new(tracked(&drops, 1));
            assert!(c.is_boxed());
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn assign_same_type_reuses_table_and_storage() {
        let drops = Arc::new(AtomicUsize::new(0));
        let make = |v| tracked(&drops, v);
        let mut c: TaskClosure<(), u64> = TaskClosure::new(make(1));
        let before = c.table();

        c.assign(make(2));
        assert!(registry::same_table(before, c.table()));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(c.invoke(()), 2);
    }

    #[test]
    fn assign_other_type_rebinds_table() {
        let mut c: TaskClosure<(), u32> = TaskClosure::new(|| 1u32);
        let before = c.table();
        let offset = 10u32;
        c.assign(move || offset + 1);
        assert!(!registry::same_table(before, c.table()));
        assert_eq!(c.invoke(()), 11);
    }

    #[test]
    fn assign_into_empty_closure() {
        let mut c: TaskClosure<(), u32> = TaskClosure::none();
        c.assign(|| 5u32);
        assert!(!c.is_empty());
        assert_eq!(c.invoke(()), 5);
    }

    #[test]
    fn reset_drops_and_empties() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut c: TaskClosure<(), u64> = TaskClosure::new(tracked(&drops, 1));
        c.reset();
        assert!(c.is_empty());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        c.reset();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn swap_exchanges_callables() {
        let mut a: TaskClosure<(), u32> = TaskClosure::new(|| 1u32);
        let mut b: TaskClosure<(), u32> = TaskClosure::none();
        a.swap(&mut b);
        assert!(a.is_empty());
        assert_eq!(b.invoke(()), 1);
    }

    #[test]
    fn holds_reports_concrete_type() {
        fn seven() -> u32 {
            7
        }
        let c: TaskClosure<(), u32> = TaskClosure::new(seven as fn() -> u32);
        assert!(c.holds::<fn() -> u32>());
        assert!(!TaskClosure::<(), u32>::none().holds::<fn() -> u32>());
    }

    #[test]
    fn try_invoke_on_empty_is_an_error() {
        let mut c: TaskClosure<(), u32> = TaskClosure::none();
        assert_eq!(c.try_invoke(()), Err(ClosureError::Empty));
    }

    #[test]
    #[should_panic(expected = "invoked an empty task closure")]
    fn invoke_on_empty_panics() {
        let mut c: TaskClosure<(), u32> = TaskClosure::none();
        c.invoke(());
    }

    #[test]
    fn invoke_once_releases_even_on_panic() {
        let drops = Arc::new(AtomicUsize::new(0));
        let guard = Tracked {
            drops: Arc::clone(&drops),
            value: 0,
            _pad: [0; 3],
        };
        let c: TaskClosure<()> = TaskClosure::new(move || {
            let _held = &guard;
            panic!("boom");
        });
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| c.invoke_once(())));
        assert!(result.is_err());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn debug_names_storage() {
        let c: TaskClosure<(), u8> = TaskClosure::new(|| 1u8);
        assert!(format!("{c:?}").contains("inline"));
    }
}
