//! Running nodes: the producer and replica roles as sets of tokio tasks.
//!
//! A producer node runs a change-ingestion task and a request-answering
//! task. A replica node runs a stream-ingestion task and a lifecycle driver.
//! Tasks share state only through the role object they wrap.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use treesync_core::Delta;
use treesync_store::Store;
use treesync_sync::{
    DeltaStream, Producer, ProducerConfig, Replica, RequestChannel, RequestListener, SyncConfig,
};

use crate::error::Result;

/// Configuration for both node roles.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Producer settings.
    pub producer: ProducerConfig,
    /// Replica settings.
    pub sync: SyncConfig,
}

impl NodeConfig {
    /// Build a producer over `store` with this configuration.
    pub fn producer<S: Store>(&self, store: S) -> Producer<S> {
        Producer::new(store, self.producer.clone())
    }

    /// Build a replica over `store` with this configuration.
    pub fn replica<S: Store, C: RequestChannel>(&self, store: S, channel: C) -> Replica<S, C> {
        Replica::new(store, channel, self.sync.clone())
    }
}

/// A producer with its tasks running.
pub struct ProducerNode<S: Store + 'static> {
    producer: Arc<Producer<S>>,
    publish: JoinHandle<()>,
    serve: JoinHandle<()>,
}

impl<S: Store + 'static> ProducerNode<S> {
    /// Spawn the change-ingestion and request-answering tasks.
    ///
    /// Register delta sinks on `producer` before starting, or deltas
    /// committed in between are not seen by them.
    pub fn start<L>(
        producer: Arc<Producer<S>>,
        listener: L,
        changes: mpsc::Receiver<Delta>,
    ) -> Self
    where
        L: RequestListener + 'static,
    {
        let publisher = Arc::clone(&producer);
        let publish = tokio::spawn(async move {
            publisher.publish_loop(changes).await;
        });

        let server = Arc::clone(&producer);
        let serve = tokio::spawn(async move {
            if let Err(e) = server.serve(&listener).await {
                tracing::error!(error = %e, "request listener failed");
            }
        });

        tracing::info!(timestamp = %producer.timestamp(), "producer node started");
        Self {
            producer,
            publish,
            serve,
        }
    }

    pub fn producer(&self) -> &Arc<Producer<S>> {
        &self.producer
    }

    /// Whether the change source has closed and every change was applied.
    pub fn is_drained(&self) -> bool {
        self.publish.is_finished()
    }

    /// Stop answering requests and applying changes.
    pub async fn shutdown(self) {
        self.publish.abort();
        self.serve.abort();
        // Cancellation is the expected outcome here.
        let _ = self.publish.await;
        let _ = self.serve.await;
        tracing::info!(timestamp = %self.producer.timestamp(), "producer node stopped");
    }
}

/// A replica with its tasks running.
pub struct ReplicaNode<S: Store + 'static, C: RequestChannel + 'static> {
    replica: Arc<Replica<S, C>>,
    ingest: JoinHandle<()>,
    driver: JoinHandle<treesync_sync::Result<()>>,
}

impl<S: Store + 'static, C: RequestChannel + 'static> ReplicaNode<S, C> {
    /// Spawn the stream-ingestion task and the lifecycle driver.
    ///
    /// Ingestion stops as soon as the driver does, so a replica left in
    /// `Diverged` or `Paused` does not keep queueing deltas.
    pub fn start<D>(replica: Arc<Replica<S, C>>, stream: D) -> Self
    where
        D: DeltaStream + 'static,
    {
        let ingesting = Arc::clone(&replica);
        let ingest = tokio::spawn(async move {
            if let Err(e) = ingesting.run_ingest(&stream).await {
                tracing::error!(error = %e, "delta stream failed");
            }
        });

        let driving = Arc::clone(&replica);
        let ingest_abort = ingest.abort_handle();
        let driver = tokio::spawn(async move {
            let outcome = driving.run().await;
            ingest_abort.abort();
            outcome
        });

        tracing::info!("replica node started");
        Self {
            replica,
            ingest,
            driver,
        }
    }

    pub fn replica(&self) -> &Arc<Replica<S, C>> {
        &self.replica
    }

    /// Whether the lifecycle driver has stopped.
    pub fn is_stopped(&self) -> bool {
        self.driver.is_finished()
    }

    /// Wait for the lifecycle driver to stop.
    ///
    /// The driver only stops on a fatal fault, so this resolves with that
    /// fault, typically a divergence.
    pub async fn wait(self) -> Result<()> {
        let outcome = self.driver.await;
        self.ingest.abort();

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(error = %e, phase = %self.replica.phase(), "replica stopped");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stop both tasks.
    pub async fn shutdown(self) {
        self.driver.abort();
        self.ingest.abort();
        let _ = self.driver.await;
        let _ = self.ingest.await;
        tracing::info!(phase = %self.replica.phase(), "replica node stopped");
    }
}
