//! A run-to-completion thread manager on a rayon pool.
//!
//! Each registered thread becomes one pool job. The first job a worker runs
//! binds the owning locality's applier to that worker, so work can submit
//! more work through the free functions. [`PoolThreadManager::shutdown`]
//! clears those bindings; the bound `Arc<Applier>` would otherwise keep the
//! pool, and so its workers, alive.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use tandem_applier::{
    Applier, ApplierError, ThreadId, ThreadInitData, ThreadManager, ThreadPriority, ThreadState,
    ThreadStateEx,
};
use tracing::{debug, info, trace, warn};

use crate::config::ThreadsConfig;
use crate::error::RuntimeError;

#[derive(Debug, Default)]
struct PoolStats {
    threads: AtomicUsize,
    work: AtomicUsize,
    completed: AtomicUsize,
    reruns: AtomicUsize,
}

/// Point-in-time view of a pool's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub threads_registered: usize,
    pub work_registered: usize,
    pub completed: usize,
    pub reruns: usize,
}

impl PoolSnapshot {
    pub fn accepted(&self) -> usize {
        self.threads_registered + self.work_registered
    }

    pub fn in_flight(&self) -> usize {
        self.accepted().saturating_sub(self.completed)
    }
}

#[derive(Default)]
struct Shared {
    applier: OnceLock<Weak<Applier>>,
    closed: AtomicBool,
    stats: PoolStats,
}

impl Shared {
    /// Bind the owning applier to this worker unless something is bound or
    /// the pool is shutting down.
    fn bind_worker(&self) {
        if self.closed.load(Ordering::SeqCst) || Applier::current().is_some() {
            return;
        }
        if let Some(applier) = self.applier.get().and_then(Weak::upgrade) {
            applier.bind_to_context();
        }
    }
}

struct Job {
    id: Option<ThreadId>,
    data: ThreadInitData,
    shared: Arc<Shared>,
}

impl Job {
    fn run(mut self) {
        self.shared.bind_worker();
        trace!(thread = ?self.id, tag = %self.data.description, "running job");

        let result = self.data.function.invoke((ThreadStateEx::WaitSignaled,));
        match result.state {
            ThreadState::Terminated => {
                self.shared.stats.completed.fetch_add(1, Ordering::SeqCst);
            }
            ThreadState::Pending | ThreadState::Active => {
                self.shared.stats.reruns.fetch_add(1, Ordering::SeqCst);
                rayon::spawn_fifo(move || self.run());
            }
            ThreadState::Suspended => {
                warn!(tag = %self.data.description, "thread suspended itself; nothing will wake it");
                self.shared.stats.completed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

pub struct PoolThreadManager {
    pool: rayon::ThreadPool,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    workers: usize,
}

impl PoolThreadManager {
    pub fn new(config: &ThreadsConfig) -> Result<Self, RuntimeError> {
        let workers = config.resolved_worker_threads();
        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |index| format!("{prefix}-{index}"))
            .exit_handler(|index| {
                if Applier::unbind_context().is_some() {
                    debug!(worker = index, "worker exited");
                }
            })
            .build()?;
        info!(workers, "thread pool started");

        Ok(Self {
            pool,
            shared: Arc::new(Shared::default()),
            next_id: AtomicU64::new(1),
            workers,
        })
    }

    /// Set the applier workers bind on first use. Only the first call counts.
    pub fn attach(&self, applier: &Arc<Applier>) -> bool {
        self.shared.applier.set(Arc::downgrade(applier)).is_ok()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let stats = &self.shared.stats;
        // `completed` first: a job is accepted before it can complete, so
        // reading it last could count a child job's parent as done while
        // missing the child's registration.
        let completed = stats.completed.load(Ordering::SeqCst);
        let reruns = stats.reruns.load(Ordering::SeqCst);
        PoolSnapshot {
            threads_registered: stats.threads.load(Ordering::SeqCst),
            work_registered: stats.work.load(Ordering::SeqCst),
            completed,
            reruns,
        }
    }

    /// Stop binding new workers and clear every worker's binding.
    ///
    /// Blocks until each worker has finished its current job. Returns how
    /// many workers had an applier bound.
    pub fn shutdown(&self) -> usize {
        self.shared.closed.store(true, Ordering::SeqCst);
        let unbound = self
            .pool
            .broadcast(|_| Applier::unbind_context())
            .into_iter()
            .flatten()
            .count();
        debug!(unbound, "pool workers unbound");
        unbound
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Block until every accepted job has finished, or `timeout` passes.
    /// Returns whether the pool went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.snapshot().in_flight() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn accept(&self, initial_state: ThreadState) -> Result<(), ApplierError> {
        if initial_state == ThreadState::Suspended {
            return Err(ApplierError::Scheduler(
                "this pool runs work to completion and cannot create suspended threads".into(),
            ));
        }
        Ok(())
    }

    fn spawn(&self, job: Job) {
        if let Some(os_thread) = job.data.os_thread {
            trace!(os_thread, "worker affinity hint ignored");
        }
        match job.data.priority {
            ThreadPriority::High | ThreadPriority::Boost => self.pool.spawn(move || job.run()),
            _ => self.pool.spawn_fifo(move || job.run()),
        }
    }
}

impl ThreadManager for PoolThreadManager {
    fn register_thread(
        &self,
        data: ThreadInitData,
        initial_state: ThreadState,
        run_now: bool,
    ) -> Result<ThreadId, ApplierError> {
        self.accept(initial_state)?;
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = NonZeroU64::new(raw)
            .map(ThreadId::new)
            .ok_or_else(|| ApplierError::Scheduler("thread id space exhausted".into()))?;

        self.shared.stats.threads.fetch_add(1, Ordering::SeqCst);
        trace!(thread = %id, run_now, "thread registered");
        self.spawn(Job {
            id: Some(id),
            data,
            shared: Arc::clone(&self.shared),
        });
        Ok(id)
    }

    fn register_work(
        &self,
        data: ThreadInitData,
        initial_state: ThreadState,
    ) -> Result<(), ApplierError> {
        self.accept(initial_state)?;
        self.shared.stats.work.fetch_add(1, Ordering::SeqCst);
        self.spawn(Job {
            id: None,
            data,
            shared: Arc::clone(&self.shared),
        });
        Ok(())
    }
}
