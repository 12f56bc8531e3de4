//! Recording doubles for the applier's collaborators.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tandem_applier::{
    Applier, ApplierBuilder, ApplierError, ComponentType, DeliveryFuture, GlobalAddress,
    LocalAddress, LocalityId, LocalityResolver, Parcel, ParcelTransport, ThreadId,
    ThreadInitData, ThreadManager, ThreadState, ThreadStateEx,
};

// ── Thread manager ──────────────────────────────────────────────────

pub struct Registered {
    pub data: ThreadInitData,
    pub initial_state: ThreadState,
    /// `None` for `register_work`.
    pub run_now: Option<bool>,
}

#[derive(Default)]
pub struct RecordingThreadManager {
    pub thread_calls: AtomicUsize,
    pub work_calls: AtomicUsize,
    next_id: AtomicU64,
    registered: Mutex<Vec<Registered>>,
}

impl RecordingThreadManager {
    pub fn calls(&self) -> usize {
        self.thread_calls.load(Ordering::SeqCst) + self.work_calls.load(Ordering::SeqCst)
    }

    pub fn take_registered(&self) -> Vec<Registered> {
        std::mem::take(&mut *self.registered.lock().unwrap())
    }

    /// Run every registered function on the calling thread.
    pub fn run_all(&self) -> usize {
        let registered = self.take_registered();
        let count = registered.len();
        for mut entry in registered {
            entry.data.function.invoke((ThreadStateEx::WaitSignaled,));
        }
        count
    }
}

impl ThreadManager for RecordingThreadManager {
    fn register_thread(
        &self,
        data: ThreadInitData,
        initial_state: ThreadState,
        run_now: bool,
    ) -> Result<ThreadId, ApplierError> {
        self.thread_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.registered.lock().unwrap().push(Registered {
            data,
            initial_state,
            run_now: Some(run_now),
        });
        Ok(ThreadId::new(NonZeroU64::new(id).unwrap()))
    }

    fn register_work(
        &self,
        data: ThreadInitData,
        initial_state: ThreadState,
    ) -> Result<(), ApplierError> {
        self.work_calls.fetch_add(1, Ordering::SeqCst);
        self.registered.lock().unwrap().push(Registered {
            data,
            initial_state,
            run_now: None,
        });
        Ok(())
    }
}

// ── Resolver ────────────────────────────────────────────────────────

pub struct FixedResolver {
    pub local: LocalityId,
    pub all: BTreeSet<LocalityId>,
    pub unreachable: bool,
    pub resolve_calls: AtomicUsize,
}

impl LocalityResolver for FixedResolver {
    fn local_locality(&self) -> LocalityId {
        self.local
    }

    fn resolve(&self, address: &GlobalAddress) -> Result<(LocalityId, LocalAddress), ApplierError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok((address.locality()?, LocalAddress(address.lsb)))
    }

    fn enumerate(&self, _filter: ComponentType) -> Result<BTreeSet<LocalityId>, ApplierError> {
        if self.unreachable {
            return Err(ApplierError::AddressingUnreachable("resolver offline".into()));
        }
        Ok(self.all.clone())
    }
}

// ── Transport ───────────────────────────────────────────────────────

pub struct RecordingTransport {
    pub local: LocalityId,
    pub all: BTreeSet<LocalityId>,
    pub send_calls: AtomicUsize,
    pub reject: Option<String>,
    sent: Mutex<Vec<(Parcel, LocalityId)>>,
}

impl RecordingTransport {
    pub fn take_sent(&self) -> Vec<(Parcel, LocalityId)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl ParcelTransport for RecordingTransport {
    fn send(&self, parcel: Parcel, destination: LocalityId) -> Result<DeliveryFuture, ApplierError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.reject {
            return Err(ApplierError::TransportFailure(reason.clone()));
        }
        self.sent.lock().unwrap().push((parcel, destination));
        Ok(Box::pin(std::future::ready(Ok(()))))
    }

    fn localities(&self, _filter: ComponentType) -> Result<BTreeSet<LocalityId>, ApplierError> {
        Ok(self.all.clone())
    }

    fn remote_localities(&self, filter: ComponentType) -> Result<BTreeSet<LocalityId>, ApplierError> {
        let mut all = self.localities(filter)?;
        all.remove(&self.local);
        Ok(all)
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub threads: Arc<RecordingThreadManager>,
    pub resolver: Arc<FixedResolver>,
    pub transport: Arc<RecordingTransport>,
    pub applier: Arc<Applier>,
}

pub struct HarnessBuilder {
    local: u32,
    peers: Vec<u32>,
    unreachable: bool,
    reject: Option<String>,
    verify_locks: bool,
}

impl HarnessBuilder {
    pub fn new(local: u32) -> Self {
        Self {
            local,
            peers: Vec::new(),
            unreachable: false,
            reject: None,
            verify_locks: true,
        }
    }

    pub fn peers(mut self, peers: &[u32]) -> Self {
        self.peers = peers.to_vec();
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn reject_sends(mut self, reason: &str) -> Self {
        self.reject = Some(reason.to_string());
        self
    }

    pub fn verify_locks(mut self, verify: bool) -> Self {
        self.verify_locks = verify;
        self
    }

    pub fn build(self) -> Harness {
        let local = LocalityId::new(self.local);
        let all: BTreeSet<_> = std::iter::once(self.local)
            .chain(self.peers)
            .map(LocalityId::new)
            .collect();

        let threads = Arc::new(RecordingThreadManager::default());
        let resolver = Arc::new(FixedResolver {
            local,
            all: all.clone(),
            unreachable: self.unreachable,
            resolve_calls: AtomicUsize::new(0),
        });
        let transport = Arc::new(RecordingTransport {
            local,
            all,
            send_calls: AtomicUsize::new(0),
            reject: self.reject,
            sent: Mutex::new(Vec::new()),
        });
        let applier = ApplierBuilder::new(threads.clone(), resolver.clone(), transport.clone())
            .verify_locks(self.verify_locks)
            .build();

        Harness {
            threads,
            resolver,
            transport,
            applier,
        }
    }
}

impl Harness {
    pub fn new(local: u32, peers: &[u32]) -> Self {
        HarnessBuilder::new(local).peers(peers).build()
    }

    pub fn thread_calls(&self) -> usize {
        self.threads.calls()
    }

    pub fn transport_calls(&self) -> usize {
        self.transport.send_calls.load(Ordering::SeqCst)
    }
}
