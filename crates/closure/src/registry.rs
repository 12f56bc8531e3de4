//! Process-wide cache of operation tables.
//!
//! Each `(callable type, signature)` pair gets exactly one table, created the
//! first time a closure of that type is built and leaked for the rest of the
//! process. Each signature also gets exactly one canonical empty table.
//! Lookups after the first take a shared read lock and never allocate.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ptr;
use std::sync::{OnceLock, PoisonError, RwLock};

use tracing::trace;

use crate::callable::Callable;
use crate::table::{CallableTable, EmptyTable, OperationTable};

type TableEntry = &'static (dyn Any + Send + Sync);

static TABLES: OnceLock<RwLock<HashMap<TypeId, TableEntry>>> = OnceLock::new();

/// Registry key for the empty table of a signature. Private, so no callable
/// type can collide with it.
struct EmptyKey;

fn tables() -> &'static RwLock<HashMap<TypeId, TableEntry>> {
    TABLES.get_or_init(|| RwLock::new(HashMap::new()))
}

/// The shared table for callables of type `F` with signature `Args -> R`.
pub fn table_for<F, Args, R>() -> &'static dyn OperationTable<Args, R>
where
    F: Callable<Args, R>,
    Args: 'static,
    R: 'static,
{
    lookup_or_insert::<PhantomData<(F, Args, R)>, Args, R>(|| Box::new(CallableTable::<F>::new()))
}

/// The canonical empty table for signature `Args -> R`.
pub fn empty_table<Args: 'static, R: 'static>() -> &'static dyn OperationTable<Args, R> {
    lookup_or_insert::<PhantomData<(EmptyKey, Args, R)>, Args, R>(|| {
        Box::new(EmptyTable::new::<Args, R>())
    })
}

/// Whether two table references denote the same table.
///
/// Only the data address is compared; trait-object metadata may legitimately
/// differ between codegen units for the same table.
pub fn same_table<Args, R>(
    a: &dyn OperationTable<Args, R>,
    b: &dyn OperationTable<Args, R>,
) -> bool {
    ptr::addr_eq(a, b)
}

/// Number of tables materialized so far, empty tables included.
pub fn registered_tables() -> usize {
    tables().read().unwrap_or_else(PoisonError::into_inner).len()
}

fn lookup_or_insert<K: 'static, Args: 'static, R: 'static>(
    make: impl FnOnce() -> Box<dyn OperationTable<Args, R>>,
) -> &'static dyn OperationTable<Args, R> {
    let key = TypeId::of::<K>();

    if let Some(entry) = tables()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return downcast(*entry);
    }

    let mut tables = tables().write().unwrap_or_else(PoisonError::into_inner);
    let entry = *tables.entry(key).or_insert_with(|| {
        let table: &'static dyn OperationTable<Args, R> = Box::leak(make());
        trace!(callable = table.type_name(), "materialized operation table");
        let entry: TableEntry = Box::leak(Box::new(table));
        entry
    });
    downcast(entry)
}

fn downcast<Args: 'static, R: 'static>(entry: TableEntry) -> &'static dyn OperationTable<Args, R> {
    *entry
        .downcast_ref::<&'static dyn OperationTable<Args, R>>()
        .expect("registry entries are keyed by their signature")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of<F: Callable<(), u32>>(_: &F) -> &'static dyn OperationTable<(), u32> {
        table_for::<F, (), u32>()
    }

    #[test]
    fn same_type_same_table() {
        let f = || 1u32;
        let a = key_of(&f);
        let b = key_of(&f);
        assert!(same_table(a, b));
    }

    #[test]
    fn distinct_types_distinct_tables() {
        let f = || 1u32;
        let g = || 2u32;
        assert!(!same_table(key_of(&f), key_of(&g)));
    }

    #[test]
    fn one_empty_table_per_signature() {
        let a = empty_table::<(), u32>();
        let b = empty_table::<(), u32>();
        assert!(same_table(a, b));
        assert!(a.is_canonical_empty());

        let other = empty_table::<(u8,), u32>();
        assert!(other.is_canonical_empty());
    }

    #[test]
    fn callable_table_is_not_empty_table() {
        let f = || 3u32;
        assert!(!same_table(key_of(&f), empty_table::<(), u32>()));
        assert!(!key_of(&f).is_canonical_empty());
    }

    #[test]
    fn tables_are_counted() {
        let f = || 4u32;
        let _ = key_of(&f);
        assert!(registered_tables() >= 1);
    }
}
