//! Vocabulary shared with the thread manager: states, priorities, stack
//! classes, and the init data a lightweight thread is registered with.

use std::borrow::Cow;
use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use tandem_closure::TaskClosure;

use crate::naming::LocalAddress;

// ── Scheduling hints ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPriority {
    #[default]
    Default,
    Low,
    Normal,
    High,
    /// Run the first time at high priority, then fall back to normal.
    Boost,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackSize {
    #[default]
    Default,
    Small,
    Medium,
    Large,
    Huge,
    /// The work never suspends and may run directly on the scheduling thread.
    NoStack,
}

/// State a thread is created in, and the state a thread function asks for
/// when it returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    #[default]
    Pending,
    Suspended,
    Active,
    Terminated,
}

/// Why a thread function was (re)started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStateEx {
    #[default]
    WaitSignaled,
    WaitTimeout,
    WaitTerminate,
    WaitAbort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(NonZeroU64);

impl ThreadId {
    pub const fn new(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// What a thread function returns: the state to move to and, optionally,
/// a thread to run next on the same worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadResult {
    pub state: ThreadState,
    pub next: Option<ThreadId>,
}

impl ThreadResult {
    pub const fn terminated() -> Self {
        Self {
            state: ThreadState::Terminated,
            next: None,
        }
    }
}

/// The erased body of a lightweight thread.
pub type ThreadFunction = TaskClosure<(ThreadStateEx,), ThreadResult>;

// ── Descriptions ────────────────────────────────────────────────────

/// Human-readable tag attached to a unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ThreadDescription {
    #[default]
    Unset,
    Text(Cow<'static, str>),
    /// Synthesized from the callable's type and the entry point it came through.
    Callable {
        type_name: &'static str,
        via: &'static str,
    },
}

impl ThreadDescription {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Fill an unset description from a held callable's type name, falling
    /// back to the entry-point name.
    pub fn or_synthesize(self, type_name: Option<&'static str>, via: &'static str) -> Self {
        match (self, type_name) {
            (Self::Unset, Some(type_name)) => Self::Callable { type_name, via },
            (Self::Unset, None) => Self::Text(Cow::Borrowed(via)),
            (described, _) => described,
        }
    }
}

impl From<&'static str> for ThreadDescription {
    fn from(text: &'static str) -> Self {
        Self::Text(Cow::Borrowed(text))
    }
}

impl From<String> for ThreadDescription {
    fn from(text: String) -> Self {
        Self::Text(Cow::Owned(text))
    }
}

impl fmt::Display for ThreadDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "<unknown>"),
            Self::Text(text) => write!(f, "{text}"),
            Self::Callable { type_name, via } => write!(f, "{via}({type_name})"),
        }
    }
}

// ── Registration data ───────────────────────────────────────────────

/// Everything the thread manager needs to create one lightweight thread.
#[derive(Debug)]
pub struct ThreadInitData {
    pub function: ThreadFunction,
    pub description: ThreadDescription,
    pub lva: LocalAddress,
    pub priority: ThreadPriority,
    /// Preferred OS worker thread, if any.
    pub os_thread: Option<usize>,
    pub stack_size: StackSize,
}

impl ThreadInitData {
    pub fn new(function: ThreadFunction) -> Self {
        Self {
            function,
            description: ThreadDescription::Unset,
            lva: LocalAddress::NULL,
            priority: ThreadPriority::Default,
            os_thread: None,
            stack_size: StackSize::Default,
        }
    }

    pub fn description(mut self, description: impl Into<ThreadDescription>) -> Self {
        self.description = description.into();
        self
    }

    pub fn lva(mut self, lva: LocalAddress) -> Self {
        self.lva = lva;
        self
    }

    pub fn priority(mut self, priority: ThreadPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn os_thread(mut self, os_thread: usize) -> Self {
        self.os_thread = Some(os_thread);
        self
    }

    pub fn stack_size(mut self, stack_size: StackSize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

/// Scheduling metadata carried by a work descriptor.
#[derive(Debug, Clone)]
pub struct ThreadHints {
    pub description: ThreadDescription,
    pub initial_state: ThreadState,
    pub run_now: bool,
    pub priority: ThreadPriority,
    pub os_thread: Option<usize>,
    pub stack_size: StackSize,
}

impl Default for ThreadHints {
    fn default() -> Self {
        Self {
            description: ThreadDescription::Unset,
            initial_state: ThreadState::Pending,
            run_now: true,
            priority: ThreadPriority::Default,
            os_thread: None,
            stack_size: StackSize::Default,
        }
    }
}
