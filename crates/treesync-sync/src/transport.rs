//! Transport abstraction for the replication protocol.
//!
//! The protocol needs two channels: a fan-out stream carrying delta frames
//! from the producer to every subscriber, and a strictly request/response
//! channel between one subscriber and the producer. Implementations may use
//! sockets, a message broker, or anything else that moves frames reliably.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{Result, SyncError};

/// Subscriber side of the delta fan-out.
///
/// Delivery is assumed reliable and ordered per subscriber.
#[async_trait]
pub trait DeltaStream: Send + Sync {
    /// Receive the next delta frame.
    ///
    /// Returns `SyncError::ChannelClosed` once the producer side is gone.
    async fn recv(&self) -> Result<Bytes>;
}

/// Subscriber side of the request/response channel.
#[async_trait]
pub trait RequestChannel: Send + Sync {
    /// Send one request frame and wait for its response frame.
    ///
    /// At most one call is outstanding at a time; implementations may
    /// serialise concurrent callers.
    async fn request(&self, frame: Bytes) -> Result<Bytes>;
}

/// Producer side of the request/response channel.
#[async_trait]
pub trait RequestListener: Send + Sync {
    /// Wait for the next request.
    async fn accept(&self) -> Result<IncomingRequest>;
}

/// A request frame together with the means to answer it.
#[derive(Debug)]
pub struct IncomingRequest {
    frame: Bytes,
    reply: oneshot::Sender<Bytes>,
}

impl IncomingRequest {
    pub fn new(frame: Bytes, reply: oneshot::Sender<Bytes>) -> Self {
        Self { frame, reply }
    }

    /// The raw request frame.
    pub fn frame(&self) -> &Bytes {
        &self.frame
    }

    /// Send the response frame back to the requester.
    pub fn respond(self, frame: Bytes) -> Result<()> {
        self.reply
            .send(frame)
            .map_err(|_| SyncError::TransportError("requester went away".into()))
    }
}

/// An in-process network for tests and single-process deployments.
///
/// One producer, any number of subscribers, connected by tokio channels.
pub mod memory {
    use super::*;
    use std::future;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use tokio::sync::mpsc;

    use crate::messages::DeltaMessage;
    use crate::publisher::DeltaHandler;

    const REQUEST_BACKLOG: usize = 64;

    /// Shared state for the memory network.
    pub struct MemoryNetwork {
        /// Delta senders, one per connected subscriber.
        subscribers: Mutex<Vec<mpsc::UnboundedSender<Bytes>>>,
        requests: mpsc::Sender<IncomingRequest>,
        listener: Mutex<Option<mpsc::Receiver<IncomingRequest>>>,
        partitioned: AtomicBool,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            let (requests, listener) = mpsc::channel(REQUEST_BACKLOG);
            Arc::new(Self {
                subscribers: Mutex::new(Vec::new()),
                requests,
                listener: Mutex::new(Some(listener)),
                partitioned: AtomicBool::new(false),
            })
        }

        /// A handler that fans published deltas out to every subscriber.
        ///
        /// Register it with the producer.
        pub fn delta_sink(self: &Arc<Self>) -> MemoryDeltaSink {
            MemoryDeltaSink {
                network: Arc::clone(self),
            }
        }

        /// Connect a new subscriber.
        ///
        /// The subscriber only sees deltas published after this call.
        pub fn connect_subscriber(self: &Arc<Self>) -> (MemoryDeltaStream, MemoryRequestChannel) {
            let (tx, rx) = mpsc::unbounded_channel();
            self.lock_subscribers().push(tx);

            let stream = MemoryDeltaStream {
                receiver: tokio::sync::Mutex::new(rx),
            };
            let channel = MemoryRequestChannel {
                network: Arc::clone(self),
                in_flight: tokio::sync::Mutex::new(()),
            };
            (stream, channel)
        }

        /// Take the producer's request listener. Only the first call gets it.
        pub fn listener(&self) -> Option<MemoryRequestListener> {
            let receiver = self
                .listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()?;
            Some(MemoryRequestListener {
                receiver: tokio::sync::Mutex::new(receiver),
            })
        }

        /// While partitioned, requests are silently lost and never answered.
        ///
        /// The delta stream is unaffected.
        pub fn set_partitioned(&self, partitioned: bool) {
            self.partitioned.store(partitioned, Ordering::SeqCst);
        }

        pub fn is_partitioned(&self) -> bool {
            self.partitioned.load(Ordering::SeqCst)
        }

        /// Number of subscribers still connected.
        pub fn subscriber_count(&self) -> usize {
            let mut subscribers = self.lock_subscribers();
            subscribers.retain(|tx| !tx.is_closed());
            subscribers.len()
        }

        fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<Bytes>>> {
            self.subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Publishing side of the memory network's delta fan-out.
    pub struct MemoryDeltaSink {
        network: Arc<MemoryNetwork>,
    }

    impl DeltaHandler for MemoryDeltaSink {
        fn handle(&self, message: &DeltaMessage) {
            let frame = message.encode();
            let mut subscribers = self.network.lock_subscribers();
            // Dropped subscribers are pruned on the way.
            subscribers.retain(|tx| tx.send(frame.clone()).is_ok());
        }
    }

    /// Subscriber end of the delta fan-out.
    pub struct MemoryDeltaStream {
        receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
    }

    #[async_trait]
    impl DeltaStream for MemoryDeltaStream {
        async fn recv(&self) -> Result<Bytes> {
            let mut rx = self.receiver.lock().await;
            rx.recv().await.ok_or(SyncError::ChannelClosed)
        }
    }

    /// Subscriber end of the request channel.
    pub struct MemoryRequestChannel {
        network: Arc<MemoryNetwork>,
        in_flight: tokio::sync::Mutex<()>,
    }

    #[async_trait]
    impl RequestChannel for MemoryRequestChannel {
        async fn request(&self, frame: Bytes) -> Result<Bytes> {
            let _in_flight = self.in_flight.lock().await;

            if self.network.is_partitioned() {
                tracing::debug!("network partitioned, request lost");
                return future::pending().await;
            }

            let (reply_tx, reply_rx) = oneshot::channel();
            self.network
                .requests
                .send(IncomingRequest::new(frame, reply_tx))
                .await
                .map_err(|_| SyncError::TransportError("producer unreachable".into()))?;

            reply_rx
                .await
                .map_err(|_| SyncError::TransportError("request dropped without reply".into()))
        }
    }

    /// Producer end of the request channel.
    pub struct MemoryRequestListener {
        receiver: tokio::sync::Mutex<mpsc::Receiver<IncomingRequest>>,
    }

    #[async_trait]
    impl RequestListener for MemoryRequestListener {
        async fn accept(&self) -> Result<IncomingRequest> {
            let mut rx = self.receiver.lock().await;
            rx.recv().await.ok_or(SyncError::ChannelClosed)
        }
    }
}
