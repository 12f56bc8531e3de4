//! Heap-allocation accounting for closure construction and invocation.
//!
//! Lives in its own test binary because it installs a counting global
//! allocator. Counts are per thread so parallel tests do not interfere.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use tandem_closure::{registry, TaskClosure, INLINE_CAPACITY};

struct CountingAllocator;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

fn allocations() -> usize {
    ALLOCATIONS.with(Cell::get)
}

fn counted<T>(f: impl FnOnce() -> T) -> (T, usize) {
    let before = allocations();
    let value = f();
    (value, allocations() - before)
}

fn make_pointer_capture(base: &'static u64) -> TaskClosure<(u64,), u64> {
    TaskClosure::new(move |x: u64| *base + x)
}

static BASE: u64 = 40;

#[test]
fn pointer_sized_capture_never_allocates() {
    // First construction materializes the type's table in the registry.
    drop(make_pointer_capture(&BASE));

    let (result, allocated) = counted(|| {
        let mut closure = make_pointer_capture(&BASE);
        assert!(closure.is_inline());
        closure.invoke((2,))
    });
    assert_eq!(result, 42);
    assert_eq!(allocated, 0);
}

#[test]
fn captureless_callable_never_allocates() {
    fn make() -> TaskClosure<(), u32> {
        TaskClosure::new(|| 1u32)
    }
    drop(make());
    let _ = registry::empty_table::<(), u32>();

    let (_, allocated) = counted(|| {
        let mut closure = make();
        let mut total = 0;
        for _ in 0..100 {
            total += closure.invoke(());
        }
        let moved = closure.take();
        assert!(closure.is_empty());
        drop(moved);
        total
    });
    assert_eq!(allocated, 0);
}

#[test]
fn same_type_reassignment_on_inline_path_never_allocates() {
    fn make(n: usize) -> impl FnMut() -> usize + Send + 'static {
        move || n
    }
    let mut closure: TaskClosure<(), usize> = TaskClosure::new(make(1));
    assert!(closure.is_inline());
    let _ = registry::empty_table::<(), usize>();

    let (_, allocated) = counted(|| {
        for n in 0..10 {
            closure.assign(make(n));
        }
    });
    assert_eq!(allocated, 0);
    assert_eq!(closure.invoke(()), 9);
}

#[test]
fn oversized_capture_allocates_exactly_once() {
    fn make(words: [usize; 4]) -> TaskClosure<(), usize> {
        TaskClosure::new(move || words.iter().sum::<usize>())
    }
    drop(make([0; 4]));
    assert!(std::mem::size_of::<[usize; 4]>() > INLINE_CAPACITY);

    let (sum, allocated) = counted(|| make([1, 2, 3, 4]).invoke(()));
    assert_eq!(sum, 10);
    assert_eq!(allocated, 1);
}

#[test]
fn same_type_reassignment_on_boxed_path_reuses_the_block() {
    fn make(words: [usize; 4]) -> impl FnMut() -> usize + Send + 'static {
        move || words.iter().sum::<usize>()
    }
    let mut closure: TaskClosure<(), usize> = TaskClosure::new(make([0; 4]));
    assert!(closure.is_boxed());
    let _ = registry::empty_table::<(), usize>();

    let (_, allocated) = counted(|| {
        for n in 0..10 {
            closure.assign(make([n, n, n, n]));
        }
    });
    assert_eq!(allocated, 0);
    assert!(closure.is_boxed());
    assert_eq!(closure.invoke(()), 36);
}
