//! tandem-node — runs two localities in one process and exchanges work
//! between them over the loopback fabric.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: locality 0 plus a peer at locality 1
//! tandem-node
//!
//! # From a config file, with more traffic
//! tandem-node --config tandem.toml --tasks 64 --greetings 32
//!
//! # Via environment variables
//! TANDEM_LOCALITY_ID=4 TANDEM_WORKER_THREADS=2 RUST_LOG=debug tandem-node
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tandem_applier::{current_locality_id, Action, ActionRegistry, GlobalAddress, WorkDescriptor, WorkHandle};
use tandem_runtime::{Locality, LoopbackFabric, RuntimeConfig};
use tracing::{debug, info, warn};

static LOCAL_RUNS: AtomicUsize = AtomicUsize::new(0);
static GREETINGS: AtomicUsize = AtomicUsize::new(0);

/// Sent from the primary locality to its peer.
#[derive(Debug, Serialize, Deserialize)]
struct Greet {
    from: u32,
    seq: u32,
}

impl Action for Greet {
    const NAME: &'static str = "tandem-node.greet";

    fn execute(self) {
        GREETINGS.fetch_add(1, Ordering::SeqCst);
        debug!(from = self.from, seq = self.seq, at = ?current_locality_id(), "greeting received");
    }
}

/// Run two in-process localities and exchange work between them.
#[derive(Parser, Debug)]
#[command(name = "tandem-node", version, about)]
struct Cli {
    /// TOML config for the primary locality (defaults when omitted).
    #[arg(long, env = "TANDEM_CONFIG")]
    config: Option<PathBuf>,

    /// Local work items to run on the primary locality.
    #[arg(long, env = "TANDEM_TASKS", default_value_t = 16)]
    tasks: u32,

    /// Tracked greetings sent straight to the peer.
    #[arg(long, env = "TANDEM_GREETINGS", default_value_t = 8)]
    greetings: u32,

    /// How long to wait for all work to settle, in milliseconds.
    #[arg(long, env = "TANDEM_TIMEOUT_MS", default_value_t = 5000)]
    timeout_ms: u64,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    let config = match path {
        Some(path) => RuntimeConfig::from_file(path)?,
        // Empty TOML still picks up `TANDEM_*` overrides.
        None => RuntimeConfig::from_toml("")?,
    };
    Ok(config)
}

/// Primary config (with the peer listed) and the peer's own config.
fn pair(mut primary: RuntimeConfig) -> (RuntimeConfig, RuntimeConfig) {
    let peer_id = match primary.peers.first() {
        Some(peer) => peer.id,
        None => {
            let id = (primary.locality.id + 1) % u32::MAX;
            primary = primary.with_peer(id, &[]);
            id
        }
    };
    let mut peer = RuntimeConfig::for_locality(peer_id)
        .with_peer(primary.locality.id, &primary.locality.components);
    peer.threads = primary.threads.clone();
    peer.threads.thread_name_prefix = format!("{}-peer", primary.threads.thread_name_prefix);
    peer.applier = primary.applier.clone();
    (primary, peer)
}

fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !done() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(?cli, "starting tandem-node");

    let (primary_config, peer_config) = pair(load_config(cli.config.as_deref())?);
    let actions = Arc::new(ActionRegistry::new().with::<Greet>());
    let fabric = LoopbackFabric::start()?;
    let primary = Locality::start(primary_config, &fabric, Arc::clone(&actions))?;
    let peer = Locality::start(peer_config, &fabric, actions)?;

    let from = primary.id().get();
    let peer_address = GlobalAddress::for_locality(peer.id());

    // Each local item greets the peer from inside its worker thread.
    for seq in 0..cli.tasks {
        let work = WorkDescriptor::nullary(move || {
            LOCAL_RUNS.fetch_add(1, Ordering::SeqCst);
            let greet = WorkDescriptor::for_action(Greet { from, seq }).with_target(peer_address);
            if let Err(e) = tandem_applier::submit_fire_and_forget(greet) {
                warn!(error = %e, "nested greeting not sent");
            }
        })
        .description("local-work");
        primary.submit_fire_and_forget(work)?;
    }

    let mut deliveries = Vec::new();
    for seq in cli.tasks..cli.tasks + cli.greetings {
        let greet = WorkDescriptor::for_action(Greet { from, seq }).with_target(peer_address);
        if let WorkHandle::Remote(ticket) = primary.submit(greet)? {
            deliveries.push(ticket.delivered());
        }
    }
    let failed = futures::future::join_all(deliveries)
        .await
        .into_iter()
        .filter(Result::is_err)
        .count();

    let timeout = Duration::from_millis(cli.timeout_ms);
    let expected = (cli.tasks + cli.greetings) as usize;
    let router = Arc::clone(&fabric);
    let (primary, peer, settled) = tokio::task::spawn_blocking(move || {
        let settled = primary.wait_idle(timeout)
            && wait_for(timeout, || router.delivered() >= expected)
            && peer.wait_idle(timeout);
        (primary, peer, settled)
    })
    .await?;

    if !settled {
        warn!(timeout_ms = cli.timeout_ms, "work did not settle in time");
    }
    info!(
        local_runs = LOCAL_RUNS.load(Ordering::SeqCst),
        greetings = GREETINGS.load(Ordering::SeqCst),
        delivered = fabric.delivered(),
        failed_deliveries = failed,
        primary = ?primary.snapshot(),
        peer = ?peer.snapshot(),
        "tandem-node finished"
    );

    drop(peer);
    drop(primary);
    Ok(())
}
