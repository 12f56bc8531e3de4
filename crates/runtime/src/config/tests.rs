use std::collections::HashMap;

use super::types::{PeerConfig, RuntimeConfig};
use crate::error::RuntimeError;

#[test]
fn parse_minimal_toml() {
    let cfg: RuntimeConfig = toml::from_str("").unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.locality.id, 0);
    assert!(cfg.peers.is_empty());
    assert!(cfg.applier.verify_locks);
    assert_eq!(cfg.threads.thread_name_prefix, "tandem-worker");
}

#[test]
fn parse_full_toml() {
    let toml = r#"
[locality]
id = 3
components = [1, 2]

[threads]
worker_threads = 6
thread_name_prefix = "loc3"

[applier]
verify_locks = false

[[peers]]
id = 4
components = [2]

[[peers]]
id = 5
"#;
    let mut cfg: RuntimeConfig = toml::from_str(toml).unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.locality.id, 3);
    assert_eq!(cfg.locality.components, vec![1, 2]);
    assert_eq!(cfg.threads.worker_threads, 6);
    assert_eq!(cfg.threads.resolved_worker_threads(), 6);
    assert_eq!(cfg.threads.thread_name_prefix, "loc3");
    assert!(!cfg.applier.verify_locks);
    assert_eq!(
        cfg.peers,
        vec![
            PeerConfig { id: 4, components: vec![2] },
            PeerConfig { id: 5, components: vec![] },
        ]
    );

    cfg.apply_overrides(|_| None);
    assert_eq!(cfg.locality.id, 3);
}

#[test]
fn auto_worker_threads_resolve_to_something() {
    let cfg = RuntimeConfig::local();
    assert_eq!(cfg.threads.worker_threads, 0);
    assert!(cfg.threads.resolved_worker_threads() > 0);
}

#[test]
fn overrides_replace_parsed_values() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("TANDEM_LOCALITY_ID", "9"),
        ("TANDEM_WORKER_THREADS", "2"),
        ("TANDEM_VERIFY_LOCKS", "off"),
    ]);
    let mut cfg = RuntimeConfig::local();
    cfg.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
    assert_eq!(cfg.locality.id, 9);
    assert_eq!(cfg.threads.worker_threads, 2);
    assert!(!cfg.applier.verify_locks);
}

#[test]
fn unparseable_overrides_are_ignored() {
    let mut cfg = RuntimeConfig::for_locality(1);
    cfg.apply_overrides(|key| match key {
        "TANDEM_LOCALITY_ID" => Some("not-a-number".into()),
        "TANDEM_VERIFY_LOCKS" => Some("maybe".into()),
        _ => None,
    });
    assert_eq!(cfg.locality.id, 1);
    assert!(cfg.applier.verify_locks);
}

#[test]
fn duplicate_peer_rejected() {
    let cfg = RuntimeConfig::local().with_peer(1, &[]).with_peer(1, &[]);
    assert!(matches!(cfg.validate(), Err(RuntimeError::Config(msg)) if msg.contains("more than once")));
}

#[test]
fn peer_with_local_id_rejected() {
    let cfg = RuntimeConfig::for_locality(2).with_peer(2, &[]);
    assert!(cfg.validate().is_err());
}

#[test]
fn reserved_ids_rejected() {
    assert!(RuntimeConfig::for_locality(u32::MAX).validate().is_err());
    assert!(RuntimeConfig::local().with_peer(u32::MAX, &[]).validate().is_err());
}

#[test]
fn oversized_pool_rejected() {
    let cfg = RuntimeConfig::local().with_worker_threads(super::MAX_WORKER_THREADS + 1);
    assert!(cfg.validate().is_err());
}

#[test]
fn bad_toml_is_a_parse_error() {
    let err = RuntimeConfig::from_toml("[locality]\nid = \"zero\"").unwrap_err();
    assert!(matches!(err, RuntimeError::ConfigParse(_)));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = RuntimeConfig::from_file("/definitely/not/here/tandem.toml").unwrap_err();
    assert!(matches!(err, RuntimeError::ConfigIo(_)));
}
