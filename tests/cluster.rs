//! End-to-end tests over real TCP: coordinator, slave nodes and clients

use futures_util::{SinkExt, StreamExt};
use quorumkv::common::{protocol, CoordinatorConfig, CoordinatorRole, SlaveConfig};
use quorumkv::coordinator::{ClusterState, ReadOutcome};
use quorumkv::{Coordinator, KvClient, SlaveNode};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

async fn start_coordinator(role: CoordinatorRole, dir: &tempfile::TempDir) -> (String, Arc<ClusterState>) {
    let config = CoordinatorConfig {
        log_path: dir.path().join("kv_store.log"),
        slave_timeout_ms: 500,
        ..CoordinatorConfig::for_role(role)
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let coordinator = Coordinator::open(config).unwrap();
    let state = coordinator.state();
    tokio::spawn(coordinator.serve_on(listener));
    (addr, state)
}

fn start_slave(coordinators: Vec<String>) -> JoinHandle<()> {
    let config = SlaveConfig {
        coordinators,
        connect_timeout_ms: 500,
        base_backoff_ms: 50,
        max_backoff_ms: 200,
        ..Default::default()
    };
    tokio::spawn(SlaveNode::new(config).run())
}

async fn wait_for_slaves(state: &ClusterState, count: usize) {
    for _ in 0..200 {
        if state.registry().len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} slaves, registry has {}",
        count,
        state.registry().len()
    );
}

/// A slave that hangs up as soon as it is asked anything.
async fn start_dying_slave(addr: &str) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut framed = Framed::new(stream, protocol::codec());
    framed.send("SLAVE").await.unwrap();
    tokio::spawn(async move {
        let _ = framed.next().await;
    });
}

#[tokio::test]
async fn test_write_then_read_through_client() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_coordinator(CoordinatorRole::Primary, &dir).await;
    let slaves: Vec<_> = (0..3).map(|_| start_slave(vec![addr.clone()])).collect();
    wait_for_slaves(&state, 3).await;

    let mut client = KvClient::connect(&[addr.clone()]).await.unwrap();
    client.write("color", "blue").await.unwrap();
    assert_eq!(client.read("color").await.unwrap().as_deref(), Some("blue"));
    assert_eq!(client.read("missing").await.unwrap(), None);

    // Quorum of 2 out of 3, all acknowledged
    assert_eq!(state.routing().holder_ids("color").map(|ids| ids.len()), Some(2));
    assert_eq!(state.registry().len(), 3);

    // Overwrite goes to a fresh quorum and is visible immediately
    client.write("color", "green").await.unwrap();
    assert_eq!(client.read("color").await.unwrap().as_deref(), Some("green"));

    for slave in slaves {
        slave.abort();
    }
}

#[tokio::test]
async fn test_raw_protocol_replies() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _state) = start_coordinator(CoordinatorRole::Primary, &dir).await;

    let stream = TcpStream::connect(&addr).await.unwrap();
    let mut framed = Framed::new(stream, protocol::codec());
    framed.send("CLIENT").await.unwrap();

    framed.send("WRITE k v").await.unwrap();
    assert_eq!(framed.next().await.unwrap().unwrap(), "WRITE_DONE");
    framed.send("FETCH k").await.unwrap();
    assert_eq!(framed.next().await.unwrap().unwrap(), "INVALID_COMMAND");
    framed.send("READ").await.unwrap();
    framed.send("READ k").await.unwrap();
    // The incomplete line got no reply; no slaves means the read misses
    assert_eq!(framed.next().await.unwrap().unwrap(), "NOT FOUND");
}

#[tokio::test]
async fn test_failed_acknowledger_is_pruned() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_coordinator(CoordinatorRole::Primary, &dir).await;
    let _a = start_slave(vec![addr.clone()]);
    let _b = start_slave(vec![addr.clone()]);
    wait_for_slaves(&state, 2).await;
    start_dying_slave(&addr).await;
    wait_for_slaves(&state, 3).await;

    // The dying slave is picked with probability 2/3 per write
    let mut pruned = None;
    for attempt in 0..50 {
        let key = format!("key{}", attempt);
        let outcome = state.write(&key, "v").await;
        assert_eq!(outcome.selected.len(), 2);
        if !outcome.failed.is_empty() {
            pruned = Some((key, outcome));
            break;
        }
        assert_eq!(state.registry().len(), 3);
    }

    let (key, outcome) = pruned.expect("dying slave was never selected");
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.acknowledged.len(), 1);
    assert_eq!(state.registry().len(), 2);
    assert!(!state.registry().contains(outcome.failed[0]));
    assert_eq!(state.routing().holder_ids(&key), Some(outcome.acknowledged.clone()));

    assert_eq!(state.read(&key).await.into_response(), format!("{} v", key));
}

#[tokio::test]
async fn test_untracked_key_resolved_by_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_coordinator(CoordinatorRole::Primary, &dir).await;
    let _slaves: Vec<_> = (0..3).map(|_| start_slave(vec![addr.clone()])).collect();
    wait_for_slaves(&state, 3).await;

    state.write("k", "v").await;
    let holders = state.routing().holder_ids("k").unwrap();

    // Drop the route; the next read has to ask everyone
    for id in &holders {
        state.routing().forget("k", *id);
    }
    assert!(!state.routing().contains("k"));

    match state.read("k").await {
        ReadOutcome::Majority { response, votes, holders: found } => {
            assert_eq!(response, "k v");
            assert_eq!(votes, 2);
            let mut found = found;
            found.sort_unstable();
            let mut expected = holders.clone();
            expected.sort_unstable();
            assert_eq!(found, expected);
        }
        other => panic!("expected majority read, got {:?}", other),
    }
    assert!(state.routing().contains("k"));
}

#[tokio::test]
async fn test_client_fails_over_to_backup() {
    let dir = tempfile::tempdir().unwrap();
    let (backup_addr, backup) = start_coordinator(CoordinatorRole::Backup, &dir).await;

    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let primary_addr = dead.local_addr().unwrap().to_string();
    drop(dead);

    // The slave also skips the dead primary
    let _slave = start_slave(vec![primary_addr.clone(), backup_addr.clone()]);
    wait_for_slaves(&backup, 1).await;

    let mut client = KvClient::connect(&[primary_addr, backup_addr.clone()]).await.unwrap();
    assert_eq!(client.addr(), backup_addr);
    client.write("k", "v").await.unwrap();
    assert_eq!(client.read("k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn test_slave_disconnect_prunes_routes() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, state) = start_coordinator(CoordinatorRole::Primary, &dir).await;
    let slave = start_slave(vec![addr.clone()]);
    wait_for_slaves(&state, 1).await;

    state.write("k", "v").await;
    assert!(state.routing().contains("k"));

    slave.abort();
    wait_for_slaves(&state, 0).await;
    assert!(!state.routing().contains("k"));
    assert_eq!(state.read("k").await, ReadOutcome::NotFound);
}
