//! Entry points for code that runs inside a bound worker.
//!
//! Each function looks up the applier bound to the calling thread and
//! forwards to it. With nothing bound they return
//! [`ApplierError::RuntimeUnavailable`] and touch no collaborator.
//!
//! The `register_*` family always schedules on this locality. Plain and
//! `_data` forms pass the thread function through as given; the others
//! run their callable once and check for leaked locks afterwards.

use std::sync::Arc;

use tandem_closure::{Callable, TaskClosure};

use crate::applier::Applier;
use crate::context::current_applier_or_none;
use crate::error::ApplierError;
use crate::naming::LocalAddress;
use crate::threads::{
    ThreadHints, ThreadId, ThreadInitData, ThreadResult, ThreadState, ThreadStateEx,
};
use crate::work::{Work, WorkDescriptor, WorkHandle};

fn bound(entry: &'static str) -> Result<Arc<Applier>, ApplierError> {
    current_applier_or_none().ok_or(ApplierError::RuntimeUnavailable(entry))
}

pub fn submit(descriptor: WorkDescriptor) -> Result<WorkHandle, ApplierError> {
    bound("submit")?.submit_via(descriptor, "submit")
}

pub fn submit_fire_and_forget(descriptor: WorkDescriptor) -> Result<(), ApplierError> {
    bound("submit_fire_and_forget")?.post_via(descriptor, "submit_fire_and_forget")
}

// ── Threads ─────────────────────────────────────────────────────────

pub fn register_thread<F>(function: F, hints: ThreadHints) -> Result<ThreadId, ApplierError>
where
    F: Callable<(ThreadStateEx,), ()>,
{
    const NAME: &str = "register_thread";
    let applier = bound(NAME)?;
    applier.spawn_local(
        Work::Thread(TaskClosure::new(function)),
        hints,
        LocalAddress::NULL,
        NAME,
    )
}

pub fn register_thread_nullary<F>(function: F, hints: ThreadHints) -> Result<ThreadId, ApplierError>
where
    F: Callable<(), ()>,
{
    const NAME: &str = "register_thread_nullary";
    let applier = bound(NAME)?;
    applier.spawn_local(
        Work::Nullary(TaskClosure::new(function)),
        hints,
        LocalAddress::NULL,
        NAME,
    )
}

pub fn register_thread_plain<F>(function: F, hints: ThreadHints) -> Result<ThreadId, ApplierError>
where
    F: Callable<(ThreadStateEx,), ThreadResult>,
{
    const NAME: &str = "register_thread_plain";
    let applier = bound(NAME)?;
    applier.spawn_local(
        Work::Plain(TaskClosure::new(function)),
        hints,
        LocalAddress::NULL,
        NAME,
    )
}

pub fn register_thread_data(
    data: ThreadInitData,
    initial_state: ThreadState,
    run_now: bool,
) -> Result<ThreadId, ApplierError> {
    bound("register_thread_data")?.register_thread_data(data, initial_state, run_now)
}

// ── Work ────────────────────────────────────────────────────────────

pub fn register_work<F>(function: F, hints: ThreadHints) -> Result<(), ApplierError>
where
    F: Callable<(ThreadStateEx,), ()>,
{
    const NAME: &str = "register_work";
    let applier = bound(NAME)?;
    applier.post_local(
        Work::Thread(TaskClosure::new(function)),
        hints,
        LocalAddress::NULL,
        NAME,
    )
}

pub fn register_work_nullary<F>(function: F, hints: ThreadHints) -> Result<(), ApplierError>
where
    F: Callable<(), ()>,
{
    const NAME: &str = "register_work_nullary";
    let applier = bound(NAME)?;
    applier.post_local(
        Work::Nullary(TaskClosure::new(function)),
        hints,
        LocalAddress::NULL,
        NAME,
    )
}

/// Queue a raw thread function that operates on the object at `lva`.
pub fn register_work_plain<F>(
    function: F,
    lva: LocalAddress,
    hints: ThreadHints,
) -> Result<(), ApplierError>
where
    F: Callable<(ThreadStateEx,), ThreadResult>,
{
    const NAME: &str = "register_work_plain";
    let applier = bound(NAME)?;
    applier.post_local(Work::Plain(TaskClosure::new(function)), hints, lva, NAME)
}

pub fn register_work_data(data: ThreadInitData, initial_state: ThreadState) -> Result<(), ApplierError> {
    bound("register_work_data")?.register_work_data(data, initial_state)
}
