//! End-to-end tests of a single-node cluster over the in-process
//! collaborator: bootstrap, replicated writes, TTL expiry and the cleaning
//! task, leadership gating, membership.

use replikv::raft::{
    ClusterNode, ClusterNodeConfig, Consensus, DistStore, KvError, KvFsm, LocalConsensus, Role,
};
use replikv::{Store, StoreConfig};
use slog::{o, Logger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn create_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

struct Node {
    store: Arc<Store>,
    consensus: Arc<LocalConsensus>,
    dist_store: Arc<DistStore>,
    cluster: ClusterNode,
}

fn build_node(config: StoreConfig) -> Node {
    let logger = create_logger();

    let store = Arc::new(Store::new(logger.clone(), config).expect("store config should be valid"));
    let fsm = Arc::new(KvFsm::new(logger.clone(), store.clone()));
    let consensus = Arc::new(LocalConsensus::new(logger.clone(), fsm));
    let dist_store = Arc::new(DistStore::new(
        logger.clone(),
        consensus.clone(),
        store.clone(),
    ));
    let cluster = ClusterNode::new(
        logger,
        consensus.clone(),
        None,
        ClusterNodeConfig {
            id: "node-1".to_string(),
            real_address: "127.0.0.1:7000".to_string(),
            advertised_address: "127.0.0.1:7000".to_string(),
            bootstrap_cluster: true,
        },
    )
    .expect("cluster config should be valid");

    Node {
        store,
        consensus,
        dist_store,
        cluster,
    }
}

#[tokio::test]
async fn bootstrap_put_get() {
    let node = build_node(StoreConfig::new());
    node.cluster.run(false).await.expect("bootstrap should succeed");

    node.dist_store
        .put("a".to_string(), "1".to_string(), Duration::ZERO, None)
        .await
        .expect("put on the leader should succeed");

    assert_eq!(node.dist_store.get("a"), Ok("1".to_string()));
    assert_eq!(
        node.dist_store.consistent_get("a").await,
        Ok("1".to_string())
    );
}

#[tokio::test]
async fn recovered_originator_skips_bootstrap() {
    let node = build_node(StoreConfig::new());

    node.cluster.run(true).await.expect("recovered startup should succeed");
    // No configuration was installed; the collaborator still answers from
    // its persisted view (empty here).
    let config = node.consensus.configuration().await.unwrap();
    assert!(config.servers.is_empty());
}

#[tokio::test]
async fn writes_and_consistent_reads_are_leader_gated() {
    let node = build_node(StoreConfig::new());
    node.consensus.set_role(Role::Follower);
    node.consensus
        .set_leader_hint(Some("10.0.0.9:7000".to_string()));

    let err = node
        .dist_store
        .put("k".to_string(), "v".to_string(), Duration::ZERO, None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        KvError::NotLeader {
            leader: Some("10.0.0.9:7000".to_string())
        }
    );

    let err = node.dist_store.delete("k".to_string(), None).await.unwrap_err();
    assert!(matches!(err, KvError::NotLeader { .. }));

    let err = node.dist_store.consistent_get("k").await.unwrap_err();
    assert!(matches!(err, KvError::NotLeader { .. }));

    // Stale reads stay available on a follower.
    assert_eq!(node.dist_store.get("k"), Err(KvError::NotFound));
}

#[tokio::test]
async fn commit_timeout_is_distinct_from_not_leader() {
    let node = build_node(StoreConfig::new());
    node.cluster.run(false).await.unwrap();

    node.consensus.set_commit_delay(Some(Duration::from_secs(60)));

    let err = node
        .dist_store
        .put(
            "k".to_string(),
            "v".to_string(),
            Duration::ZERO,
            Some(Duration::from_millis(10)),
        )
        .await
        .unwrap_err();
    assert_eq!(err, KvError::Timeout);

    // A timed-out commit never reached the apply callback, so the engine is
    // untouched; the caller decides whether to retry.
    assert_eq!(node.dist_store.get("k"), Err(KvError::NotFound));
}

#[tokio::test]
async fn failed_commit_never_applies_locally() {
    let node = build_node(StoreConfig::new());
    node.cluster.run(false).await.unwrap();

    node.consensus
        .set_apply_fault(Some("replication stream broken".to_string()));

    let err = node
        .dist_store
        .put("k".to_string(), "v".to_string(), Duration::ZERO, None)
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::Consensus(_)));

    // The write never reached the engine: mutation happens only through the
    // committed-entry callback, which this commit never reached.
    assert_eq!(node.dist_store.get("k"), Err(KvError::NotFound));
    assert!(node.store.snapshot().mp.is_empty());
}

#[tokio::test]
async fn expired_key_is_hidden_then_swept_and_replicated() {
    let node = build_node(
        StoreConfig::new()
            .with_clean_interval(Duration::from_millis(50))
            .with_max_clean_duration(Duration::from_millis(20)),
    );

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleaner = node.dist_store.clone();
    let cleaning = tokio::spawn(async move {
        cleaner.run_cleaning(shutdown_rx).await;
    });

    node.cluster.run(false).await.unwrap();

    node.dist_store
        .put(
            "b".to_string(),
            "2".to_string(),
            Duration::from_millis(80),
            None,
        )
        .await
        .unwrap();
    assert_eq!(node.dist_store.get("b"), Ok("2".to_string()));

    tokio::time::sleep(Duration::from_millis(100)).await;

    // Logically absent the moment the expiration passes, swept or not.
    assert_eq!(node.dist_store.get("b"), Err(KvError::NotFound));

    // The cleaning task replicates a delete; eventually the physical entry
    // disappears from snapshots too.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        if !node.store.snapshot().mp.contains_key("b") {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "expired key should be physically removed by the cleaning task"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    cleaning.abort();
}

#[tokio::test]
async fn cleaning_stops_on_shutdown_signal() {
    let node = build_node(
        StoreConfig::new()
            .with_clean_interval(Duration::from_millis(50))
            .with_max_clean_duration(Duration::from_millis(20)),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleaner = node.dist_store.clone();
    let cleaning = tokio::spawn(async move {
        cleaner.run_cleaning(shutdown_rx).await;
    });

    node.cluster.run(false).await.unwrap();
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(2), cleaning)
        .await
        .expect("cleaning task should stop promptly on shutdown")
        .unwrap();
}

#[tokio::test]
async fn duplicate_join_is_rejected_and_leaves_configuration_unchanged() {
    let node = build_node(StoreConfig::new());
    node.cluster.run(false).await.unwrap();

    node.cluster
        .accept_join("node-2".to_string(), "127.0.0.1:7002".to_string())
        .await
        .expect("first join should be accepted");

    let members_before = node.consensus.configuration().await.unwrap().servers.len();
    assert_eq!(members_before, 2);

    // Same id, different address.
    let err = node
        .cluster
        .accept_join("node-2".to_string(), "127.0.0.1:7003".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::NodeExists { .. }));

    // Different id, same address.
    let err = node
        .cluster
        .accept_join("node-3".to_string(), "127.0.0.1:7002".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::NodeExists { .. }));

    let members_after = node.consensus.configuration().await.unwrap().servers.len();
    assert_eq!(members_after, members_before);
}

#[tokio::test]
async fn join_is_refused_on_a_follower() {
    let node = build_node(StoreConfig::new());
    node.consensus.set_role(Role::Follower);

    let err = node
        .cluster
        .accept_join("node-2".to_string(), "127.0.0.1:7002".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::NotLeader { .. }));
}

#[tokio::test]
async fn shutdown_relinquishes_leadership() {
    let node = build_node(StoreConfig::new());
    node.cluster.run(false).await.unwrap();
    assert_eq!(node.consensus.role(), Role::Leader);

    node.cluster.shutdown().await.expect("shutdown should succeed");
    assert_eq!(node.consensus.role(), Role::Follower);

    let err = node
        .dist_store
        .put("k".to_string(), "v".to_string(), Duration::ZERO, None)
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::NotLeader { .. }));
}
