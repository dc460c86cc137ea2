//! Test fixtures and helpers.
//!
//! Common setup for tests that need a producer and some replicas talking
//! over the in-memory network.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use treesync_core::Document;
use treesync_store::MemoryStore;
use treesync_sync::{
    MemoryDeltaStream, MemoryNetwork, MemoryRequestChannel, Producer, ProducerConfig, Replica,
    SyncConfig,
};

pub type TestProducer = Producer<MemoryStore>;
pub type TestReplica = Replica<MemoryStore, MemoryRequestChannel>;

/// Timeouts short enough for tests.
pub fn fast_sync_config() -> SyncConfig {
    SyncConfig {
        request_timeout: Duration::from_millis(200),
        catch_up_timeout: Duration::from_millis(200),
        verify_interval: Duration::from_millis(25),
        max_resync_attempts: Some(5),
        retry_backoff: Duration::from_millis(5),
        max_retry_backoff: Duration::from_millis(50),
    }
}

/// A producer serving requests on a fresh memory network.
///
/// Must be created inside a tokio runtime.
pub struct ReplicationFixture {
    pub network: Arc<MemoryNetwork>,
    pub producer: Arc<TestProducer>,
    server: Option<JoinHandle<()>>,
}

impl ReplicationFixture {
    pub fn new() -> Self {
        Self::with_config(ProducerConfig::default())
    }

    pub fn with_config(config: ProducerConfig) -> Self {
        let network = MemoryNetwork::new();
        let producer = Arc::new(Producer::new(MemoryStore::new(), config));
        producer.register(network.delta_sink());

        let server = network.listener().map(|listener| {
            let server_producer = Arc::clone(&producer);
            tokio::spawn(async move {
                let _ = server_producer.serve(&listener).await;
            })
        });

        Self {
            network,
            producer,
            server,
        }
    }

    /// A replica and its unconsumed delta stream.
    pub fn replica(&self, config: SyncConfig) -> (Arc<TestReplica>, MemoryDeltaStream) {
        let (stream, channel) = self.network.connect_subscriber();
        let replica = Arc::new(Replica::new(MemoryStore::new(), channel, config));
        (replica, stream)
    }

    /// A replica with its ingestion task already running.
    pub fn replica_with_ingest(&self, config: SyncConfig) -> (Arc<TestReplica>, JoinHandle<()>) {
        let (replica, stream) = self.replica(config);
        let ingesting = Arc::clone(&replica);
        let handle = tokio::spawn(async move {
            let _ = ingesting.run_ingest(&stream).await;
        });
        (replica, handle)
    }
}

impl Default for ReplicationFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReplicationFixture {
    fn drop(&mut self) {
        if let Some(server) = &self.server {
            server.abort();
        }
    }
}

/// A small delta setting `key` to `value` under the `items` node.
pub fn item_delta(key: &str, value: &str) -> Document {
    Document::new().with(&["items", key], value)
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
