// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Message channel port between the append path and the fan-out workers.
//!
//! Delivery is at-least-once; consumers must be idempotent on `event_id`.

use crate::errors::ChannelError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;

/// Broker acknowledgement for one published payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub topic: String,
    pub offset: u64,
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<Ack, ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// The consuming end of an [`InMemoryChannel`].
pub struct ChannelSubscription {
    rx: mpsc::Receiver<Delivery>,
}

impl ChannelSubscription {
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> ReceiverStream<Delivery> {
        ReceiverStream::new(self.rx)
    }
}

/// Bounded in-process channel. A full buffer makes `publish` wait up to
/// `send_timeout`, then fail with a transient error.
pub struct InMemoryChannel {
    tx: mpsc::Sender<Delivery>,
    rx: Mutex<Option<mpsc::Receiver<Delivery>>>,
    next_offset: AtomicU64,
    send_timeout: Duration,
}

impl InMemoryChannel {
    pub fn new(capacity: usize) -> Self {
        Self::with_send_timeout(capacity, Duration::from_millis(100))
    }

    pub fn with_send_timeout(capacity: usize, send_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            next_offset: AtomicU64::new(0),
            send_timeout,
        }
    }

    /// Take the single subscription. Returns `None` once taken.
    pub async fn subscribe(&self) -> Option<ChannelSubscription> {
        self.rx.lock().await.take().map(|rx| ChannelSubscription { rx })
    }

    pub fn published(&self) -> u64 {
        self.next_offset.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<Ack, ChannelError> {
        // Reserve a slot first so offsets are only handed out for accepted sends.
        let permit = match self.tx.try_reserve() {
            Ok(permit) => permit,
            Err(mpsc::error::TrySendError::Closed(())) => return Err(ChannelError::Closed),
            Err(mpsc::error::TrySendError::Full(())) => {
                match tokio::time::timeout(self.send_timeout, self.tx.reserve()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(ChannelError::Closed),
                    Err(_) => return Err(ChannelError::Full),
                }
            }
        };

        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        permit.send(Delivery {
            topic: topic.to_string(),
            offset,
            payload,
        });
        Ok(Ack {
            topic: topic.to_string(),
            offset,
        })
    }
}
