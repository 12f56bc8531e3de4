use std::fmt;

use tandem_closure::{Callable, TaskClosure};
use uuid::Uuid;

use crate::action::{Action, ErasedAction};
use crate::error::ApplierError;
use crate::locks::force_error_on_lock;
use crate::naming::{GlobalAddress, LocalityId};
use crate::threads::{
    StackSize, ThreadDescription, ThreadFunction, ThreadHints, ThreadId, ThreadPriority,
    ThreadResult, ThreadState, ThreadStateEx,
};
use crate::traits::DeliveryFuture;

// ── Work ────────────────────────────────────────────────────────────

/// The callable part of a work descriptor.
pub enum Work {
    /// A raw thread function. The `_plain` and `_data` adapters hand it to
    /// the thread manager untouched; `submit` checks locks once it terminates.
    Plain(ThreadFunction),
    /// Receives the wake reason; terminates the thread when it returns.
    Thread(TaskClosure<(ThreadStateEx,)>),
    Nullary(TaskClosure<()>),
    /// Serializable work; the only kind that can leave this locality.
    Action(Box<dyn ErasedAction>),
}

impl Work {
    pub fn is_serializable(&self) -> bool {
        matches!(self, Self::Action(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Plain(f) => f.is_empty(),
            Self::Thread(f) => f.is_empty(),
            Self::Nullary(f) => f.is_empty(),
            Self::Action(_) => false,
        }
    }

    pub fn held_type_name(&self) -> Option<&'static str> {
        match self {
            Self::Plain(f) => f.held_type_name(),
            Self::Thread(f) => f.held_type_name(),
            Self::Nullary(f) => f.held_type_name(),
            Self::Action(a) => Some(a.name()),
        }
    }

    /// Turn this work into the thread function the thread manager runs.
    ///
    /// Every form except [`Work::Plain`] runs its callable once and, when
    /// `verify_locks` is set, then checks that the worker holds no locks.
    pub(crate) fn into_thread_function(
        self,
        description: &ThreadDescription,
        verify_locks: bool,
    ) -> ThreadFunction {
        let mut body = match self {
            Self::Plain(function) => return function,
            Self::Thread(f) => Body::Thread(f),
            Self::Nullary(f) => Body::Nullary(f),
            Self::Action(a) => Body::Nullary(a.into_closure()),
        };
        let task = verify_locks.then(|| description.to_string());

        ThreadFunction::new(move |state: ThreadStateEx| {
            match std::mem::replace(&mut body, Body::Done) {
                Body::Thread(f) => f.invoke_once((state,)),
                Body::Nullary(f) => f.invoke_once(()),
                Body::Done => {}
            }
            if let Some(task) = &task {
                force_error_on_lock(task);
            }
            ThreadResult::terminated()
        })
    }
}

/// Run the lock check after `function` reports [`ThreadState::Terminated`].
pub(crate) fn lock_checked(mut function: ThreadFunction, task: String) -> ThreadFunction {
    ThreadFunction::new(move |state: ThreadStateEx| {
        let result = function.invoke((state,));
        if result.state == ThreadState::Terminated {
            force_error_on_lock(&task);
        }
        result
    })
}

enum Body {
    Thread(TaskClosure<(ThreadStateEx,)>),
    Nullary(TaskClosure<()>),
    Done,
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(c) => f.debug_tuple("Plain").field(c).finish(),
            Self::Thread(c) => f.debug_tuple("Thread").field(c).finish(),
            Self::Nullary(c) => f.debug_tuple("Nullary").field(c).finish(),
            Self::Action(a) => f.debug_tuple("Action").field(&a.name()).finish(),
        }
    }
}

// ── WorkDescriptor ──────────────────────────────────────────────────

/// A callable plus the metadata needed to schedule it somewhere.
///
/// No target means "run here".
#[derive(Debug)]
pub struct WorkDescriptor {
    pub work: Work,
    pub hints: ThreadHints,
    pub target: Option<GlobalAddress>,
}

impl WorkDescriptor {
    /// Local-only work from a nullary closure.
    pub fn new(closure: TaskClosure<()>) -> Self {
        Self::from_work(Work::Nullary(closure))
    }

    pub fn nullary<F>(callable: F) -> Self
    where
        F: Callable<(), ()>,
    {
        Self::new(TaskClosure::new(callable))
    }

    pub fn thread<F>(callable: F) -> Self
    where
        F: Callable<(ThreadStateEx,), ()>,
    {
        Self::from_work(Work::Thread(TaskClosure::new(callable)))
    }

    pub fn plain<F>(callable: F) -> Self
    where
        F: Callable<(ThreadStateEx,), ThreadResult>,
    {
        Self::from_work(Work::Plain(TaskClosure::new(callable)))
    }

    /// Work that can be routed to any locality.
    pub fn for_action<A: Action>(action: A) -> Self {
        Self::from_work(Work::Action(Box::new(action)))
    }

    pub fn from_work(work: Work) -> Self {
        Self {
            work,
            hints: ThreadHints::default(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: GlobalAddress) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_hints(mut self, hints: ThreadHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn description(mut self, description: impl Into<ThreadDescription>) -> Self {
        self.hints.description = description.into();
        self
    }

    pub fn priority(mut self, priority: ThreadPriority) -> Self {
        self.hints.priority = priority;
        self
    }

    pub fn stack_size(mut self, stack_size: StackSize) -> Self {
        self.hints.stack_size = stack_size;
        self
    }

    pub fn os_thread(mut self, os_thread: usize) -> Self {
        self.hints.os_thread = Some(os_thread);
        self
    }

    pub fn initial_state(mut self, state: ThreadState) -> Self {
        self.hints.initial_state = state;
        self
    }

    pub fn run_now(mut self, run_now: bool) -> Self {
        self.hints.run_now = run_now;
        self
    }
}

// ── Handles ─────────────────────────────────────────────────────────

/// What a tracked submission returns.
#[derive(Debug)]
pub enum WorkHandle {
    Local(ThreadId),
    Remote(DeliveryTicket),
}

impl WorkHandle {
    pub fn thread_id(&self) -> Option<ThreadId> {
        match self {
            Self::Local(id) => Some(*id),
            Self::Remote(_) => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// Tracks one parcel in flight. Dropping it does not cancel delivery.
pub struct DeliveryTicket {
    pub parcel_id: Uuid,
    pub destination: LocalityId,
    delivery: DeliveryFuture,
}

impl DeliveryTicket {
    pub(crate) fn new(parcel_id: Uuid, destination: LocalityId, delivery: DeliveryFuture) -> Self {
        Self {
            parcel_id,
            destination,
            delivery,
        }
    }

    /// Wait for the transport to report the delivery outcome.
    pub async fn delivered(self) -> Result<(), ApplierError> {
        self.delivery.await
    }
}

impl fmt::Debug for DeliveryTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryTicket")
            .field("parcel_id", &self.parcel_id)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}
