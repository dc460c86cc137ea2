//! End-to-end replication scenarios over the in-memory network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use treesync::sync::{
    ClockMode, DeltaMessage, DeltaStream, IngestOutcome, MemoryNetwork, MemoryRequestChannel,
    RequestChannel, ResyncReport,
};
use treesync::{
    Document, MemoryStore, NodeConfig, ProducerConfig, ProducerNode, Replica, ReplicaNode,
    ReplicaPhase, Store, SyncConfig, SyncError, Timestamp, VerifyOutcome,
};
use treesync_testkit::{fast_sync_config, item_delta, wait_until, ReplicationFixture};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn doc(json: serde_json::Value) -> Document {
    serde_json::from_value(json).unwrap()
}

/// Runs a hook once, after the first response arrives and before the
/// replica sees it.
struct HookedChannel<F: Fn() + Send + Sync> {
    inner: MemoryRequestChannel,
    fired: AtomicBool,
    hook: F,
}

#[async_trait]
impl<F: Fn() + Send + Sync> RequestChannel for HookedChannel<F> {
    async fn request(&self, frame: Bytes) -> treesync::sync::Result<Bytes> {
        let reply = self.inner.request(frame).await?;
        if !self.fired.swap(true, Ordering::SeqCst) {
            (self.hook)();
            // Let the ingestion task pick up whatever the hook published.
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(reply)
    }
}

/// A delta stream that never yields a frame.
struct NeverStream;

#[async_trait]
impl DeltaStream for NeverStream {
    async fn recv(&self) -> treesync::sync::Result<Bytes> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn cold_start_resync_discards_delta_covered_by_snapshot() {
    init_tracing();
    let fixture = ReplicationFixture::new();
    let (replica, _ingest) = fixture.replica_with_ingest(fast_sync_config());
    assert_eq!(replica.phase(), ReplicaPhase::Paused);

    let t1 = fixture
        .producer
        .apply_change(doc(serde_json::json!({"a": {"b": "x"}})));
    assert_eq!(t1, Timestamp::new(1));

    assert!(wait_until(Duration::from_secs(1), || replica.queue_len() == 1).await);

    let report = replica.resync().await.unwrap();
    assert_eq!(
        report,
        ResyncReport {
            baseline: Timestamp::new(1),
            applied: 0,
            discarded: 1,
        }
    );
    assert_eq!(replica.phase(), ReplicaPhase::Active);
    assert_eq!(
        replica.snapshot().document,
        doc(serde_json::json!({"a": {"b": "x"}}))
    );

    assert_eq!(
        replica.verify().await.unwrap(),
        VerifyOutcome::Consistent {
            timestamp: Timestamp::new(1)
        }
    );
}

#[tokio::test]
async fn delta_published_mid_resync_is_applied_after_baseline() {
    init_tracing();
    let network = MemoryNetwork::new();
    let producer = Arc::new(NodeConfig::default().producer(MemoryStore::new()));
    producer.register(network.delta_sink());
    let listener = network.listener().unwrap();
    let server = Arc::clone(&producer);
    tokio::spawn(async move { server.serve(&listener).await });

    producer.apply_change(doc(serde_json::json!({"a": {"b": "x"}})));

    let (stream, channel) = network.connect_subscriber();
    let during_resync = Arc::clone(&producer);
    let channel = HookedChannel {
        inner: channel,
        fired: AtomicBool::new(false),
        hook: move || {
            during_resync.apply_change(doc(serde_json::json!({"a": {"c": "y"}})));
        },
    };

    let replica = Arc::new(Replica::new(MemoryStore::new(), channel, fast_sync_config()));
    let ingesting = Arc::clone(&replica);
    tokio::spawn(async move { ingesting.run_ingest(&stream).await });

    let report = replica.resync().await.unwrap();

    assert_eq!(report.baseline, Timestamp::new(1));
    assert_eq!(report.applied, 1);
    assert_eq!(
        replica.snapshot().document,
        doc(serde_json::json!({"a": {"b": "x", "c": "y"}}))
    );
    assert_eq!(replica.timestamp(), Timestamp::new(2));
    assert!(replica.verify().await.unwrap().is_consistent());
}

#[tokio::test]
async fn stale_delta_never_rolls_back_an_active_replica() {
    let fixture = ReplicationFixture::new();
    let (replica, _stream) = fixture.replica(fast_sync_config());

    for i in 0..5 {
        fixture.producer.apply_change(item_delta("k", &i.to_string()));
    }
    replica.resync().await.unwrap();
    let before = replica.snapshot();

    let outcome = replica.ingest(DeltaMessage::new(Timestamp::new(3), item_delta("k", "old")));

    assert_eq!(outcome, IngestOutcome::Stale);
    assert_eq!(replica.snapshot(), before);
}

#[tokio::test]
async fn verify_reports_divergence_and_blocks_until_resync() {
    init_tracing();
    let fixture = ReplicationFixture::new();
    let (replica, _ingest) = fixture.replica_with_ingest(fast_sync_config());

    fixture
        .producer
        .apply_change(doc(serde_json::json!({"a": {"b": "x", "c": "y"}})));
    replica.resync().await.unwrap();

    // Same timestamp, one leaf different.
    let t = replica.timestamp();
    replica
        .store()
        .reset(doc(serde_json::json!({"a": {"b": "x", "c": "z"}})), t);

    match replica.verify().await.unwrap() {
        VerifyOutcome::Diverged { local, remote } => {
            assert_eq!(local.timestamp, remote.timestamp);
            assert_ne!(local.checksum, remote.checksum);
        }
        other => panic!("expected divergence, got {:?}", other),
    }
    assert_eq!(replica.phase(), ReplicaPhase::Diverged);

    // Deltas keep arriving while diverged; they queue rather than apply.
    fixture.producer.apply_change(item_delta("later", "1"));
    assert!(wait_until(Duration::from_secs(1), || replica.queue_len() == 1).await);
    assert_eq!(replica.verify().await.unwrap(), VerifyOutcome::Blocked);

    replica.resync().await.unwrap();
    assert_eq!(replica.snapshot(), fixture.producer.snapshot());
    assert!(replica.verify().await.unwrap().is_consistent());
}

#[tokio::test]
async fn verify_transport_fault_is_retryable_and_keeps_replica_active() {
    let fixture = ReplicationFixture::new();
    let (replica, _ingest) = fixture.replica_with_ingest(fast_sync_config());
    replica.resync().await.unwrap();

    fixture.network.set_partitioned(true);
    let err = replica.verify().await.unwrap_err();
    assert!(matches!(err, SyncError::Timeout(_)));
    assert!(err.is_retryable());
    assert_eq!(replica.phase(), ReplicaPhase::Active);

    // Deltas still flow while requests are lost.
    fixture.producer.apply_change(item_delta("k", "v"));
    assert!(wait_until(Duration::from_secs(1), || replica.timestamp() == Timestamp::new(1)).await);

    fixture.network.set_partitioned(false);
    assert!(replica.verify().await.unwrap().is_consistent());
}

#[tokio::test]
async fn nodes_keep_replicas_in_step_with_the_producer() {
    init_tracing();
    let config = NodeConfig {
        producer: ProducerConfig::default(),
        sync: fast_sync_config(),
    };
    let network = MemoryNetwork::new();

    let producer = Arc::new(config.producer(MemoryStore::new()));
    producer.register(network.delta_sink());
    let (changes, source) = mpsc::channel(64);
    let producer_node = ProducerNode::start(producer, network.listener().unwrap(), source);

    let replicas: Vec<_> = (0..3)
        .map(|_| {
            let (stream, channel) = network.connect_subscriber();
            let replica = Arc::new(config.replica(MemoryStore::new(), channel));
            ReplicaNode::start(replica, stream)
        })
        .collect();

    for i in 0..50 {
        let key = format!("k{}", i % 7);
        changes.send(item_delta(&key, &i.to_string())).await.unwrap();
    }
    drop(changes);

    assert!(wait_until(Duration::from_secs(2), || producer_node.is_drained()).await);
    let producer = Arc::clone(producer_node.producer());
    assert_eq!(producer.timestamp(), Timestamp::new(50));

    for node in &replicas {
        let replica = node.replica();
        let converged = wait_until(Duration::from_secs(2), || {
            replica.phase() == ReplicaPhase::Active && replica.snapshot() == producer.snapshot()
        })
        .await;
        assert!(converged);
        assert_eq!(replica.checksum(), producer.checksum());
    }

    for node in replicas {
        node.shutdown().await;
    }
    producer_node.shutdown().await;
}

#[tokio::test]
async fn replica_node_surfaces_divergence() {
    init_tracing();
    let fixture = ReplicationFixture::new();
    fixture.producer.apply_change(item_delta("k", "v"));

    let (replica, stream) = fixture.replica(fast_sync_config());
    let node = ReplicaNode::start(Arc::clone(&replica), stream);

    assert!(wait_until(Duration::from_secs(1), || replica.phase() == ReplicaPhase::Active).await);
    replica
        .store()
        .reset(item_delta("k", "tampered"), replica.timestamp());

    let err = tokio::time::timeout(Duration::from_secs(2), node.wait())
        .await
        .unwrap()
        .unwrap_err();

    assert!(err.is_divergence());
    assert_eq!(replica.phase(), ReplicaPhase::Diverged);
}

#[tokio::test]
async fn replica_node_stops_ingesting_once_driver_stops() {
    let fixture = ReplicationFixture::new();
    fixture.producer.apply_change(item_delta("k", "v"));

    let (replica, stream) = fixture.replica(fast_sync_config());
    let node = ReplicaNode::start(Arc::clone(&replica), stream);

    assert!(wait_until(Duration::from_secs(1), || replica.phase() == ReplicaPhase::Active).await);
    replica
        .store()
        .reset(item_delta("k", "tampered"), replica.timestamp());

    // Nobody calls wait(); the node winds down on its own.
    assert!(wait_until(Duration::from_secs(2), || node.is_stopped()).await);
    assert_eq!(replica.phase(), ReplicaPhase::Diverged);
    tokio::time::sleep(Duration::from_millis(20)).await;

    fixture.producer.apply_change(item_delta("after", "divergence"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(replica.queue_len(), 0);
}

#[tokio::test]
async fn replica_node_diverges_on_lost_delta() {
    init_tracing();
    let fixture = ReplicationFixture::new();

    // The stream is dropped, so every delta published from here on is lost.
    let (replica, stream) = fixture.replica(fast_sync_config());
    drop(stream);
    let node = ReplicaNode::start(Arc::clone(&replica), NeverStream);

    assert!(wait_until(Duration::from_secs(1), || replica.phase() == ReplicaPhase::Active).await);
    fixture.producer.apply_change(item_delta("lost", "x"));

    let err = tokio::time::timeout(Duration::from_secs(2), node.wait())
        .await
        .unwrap()
        .unwrap_err();

    assert!(err.is_divergence());
    assert_eq!(replica.phase(), ReplicaPhase::Diverged);
    assert_ne!(replica.checksum(), fixture.producer.checksum());
}

#[tokio::test]
async fn replica_node_rides_out_a_partition() {
    init_tracing();
    let fixture = ReplicationFixture::new();
    fixture.producer.apply_change(item_delta("k", "v"));
    fixture.network.set_partitioned(true);

    let (replica, stream) = fixture.replica(SyncConfig {
        max_resync_attempts: None,
        ..fast_sync_config()
    });
    let node = ReplicaNode::start(Arc::clone(&replica), stream);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_ne!(replica.phase(), ReplicaPhase::Active);

    // Deltas published during the partition are queued, not lost.
    fixture.producer.apply_change(item_delta("during", "partition"));
    assert!(wait_until(Duration::from_secs(1), || replica.queue_len() == 1).await);

    fixture.network.set_partitioned(false);
    let producer = Arc::clone(&fixture.producer);
    let recovered = wait_until(Duration::from_secs(3), || {
        replica.phase() == ReplicaPhase::Active && replica.snapshot() == producer.snapshot()
    })
    .await;
    assert!(recovered);

    node.shutdown().await;
}

#[tokio::test]
async fn wall_clock_producer_replicates() {
    let fixture = ReplicationFixture::with_config(ProducerConfig {
        clock: ClockMode::WallClock,
    });
    let (replica, _ingest) = fixture.replica_with_ingest(fast_sync_config());

    let t1 = fixture.producer.apply_change(item_delta("a", "1"));
    replica.resync().await.unwrap();
    let t2 = fixture.producer.apply_change(item_delta("b", "2"));

    assert!(t1 > Timestamp::new(1_600_000_000_000));
    assert!(t2 > t1);
    assert!(wait_until(Duration::from_secs(1), || replica.timestamp() == t2).await);
    assert!(replica.verify().await.unwrap().is_consistent());
}
