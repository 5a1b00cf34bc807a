//! Message Bus Module
//!
//! This module provides the in-process message bus connecting channel
//! adapters to the agent engine. The `MessageBus` carries inbound messages
//! (from channels to the agent) and outbound messages (from the agent back
//! to channels) on two unbounded FIFO queues.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Channel   │────>│  MessageBus │────>│  AgentLoop  │
//! │  (adapter)  │     │  (inbound)  │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            │ outbound
//!                            ▼
//! ┌─────────────┐     ┌─────────────┐
//! │   Channel   │<────│  MessageBus │
//! │  (adapter)  │     │  (outbound) │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! Consumers poll with a timeout so the agent loop can observe shutdown
//! signals between polls. Ordering is FIFO per producing adapter; there is
//! no global ordering across channels.

pub mod message;

pub use message::{InboundMessage, OutboundMessage};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::error::{AttoError, Result};

/// The central message bus for routing messages between channels and the agent.
///
/// Both directions use unbounded MPSC queues backed by Tokio: publishing
/// never blocks, and a single consumer per direction drains the queue.
pub struct MessageBus {
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<InboundMessage>>>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<OutboundMessage>>>,
}

impl MessageBus {
    /// Creates a new `MessageBus`.
    ///
    /// # Example
    /// ```
    /// use attoclaw::bus::MessageBus;
    ///
    /// let bus = MessageBus::new();
    /// ```
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Self {
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
        }
    }

    /// Publishes an inbound message to the bus without blocking.
    ///
    /// This is typically called by channel adapters when they receive a
    /// message from a user.
    ///
    /// # Errors
    /// Returns `AttoError::BusClosed` if the receiver has been dropped.
    pub fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.inbound_tx.send(msg).map_err(|_| AttoError::BusClosed)
    }

    /// Consumes the next inbound message, waiting up to `timeout`.
    ///
    /// # Returns
    /// - `Ok(Some(msg))` when a message arrived within the timeout
    /// - `Ok(None)` on timeout
    /// - `Err(AttoError::BusClosed)` when every sender has been dropped
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use attoclaw::bus::{MessageBus, InboundMessage};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let bus = MessageBus::new();
    ///     bus.publish_inbound(InboundMessage::new("cli", "user", "direct", "Hello"))
    ///         .unwrap();
    ///
    ///     let received = bus.consume_inbound(Duration::from_secs(1)).await.unwrap();
    ///     assert_eq!(received.unwrap().content, "Hello");
    /// }
    /// ```
    pub async fn consume_inbound(&self, timeout: Duration) -> Result<Option<InboundMessage>> {
        let mut rx = self.inbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => Err(AttoError::BusClosed),
            Err(_) => Ok(None),
        }
    }

    /// Publishes an outbound message to the bus without blocking.
    ///
    /// This is typically called by the agent when it has a response (or a
    /// progress chunk) to send back to a user via a channel.
    ///
    /// # Errors
    /// Returns `AttoError::BusClosed` if the receiver has been dropped.
    pub fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.outbound_tx
            .send(msg)
            .map_err(|_| AttoError::BusClosed)
    }

    /// Consumes the next outbound message, waiting up to `timeout`.
    ///
    /// Semantics mirror [`MessageBus::consume_inbound`].
    pub async fn consume_outbound(&self, timeout: Duration) -> Result<Option<OutboundMessage>> {
        let mut rx = self.outbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => Err(AttoError::BusClosed),
            Err(_) => Ok(None),
        }
    }

    /// Returns a clone of the inbound message sender.
    ///
    /// Useful for giving multiple channel adapters their own sender.
    pub fn inbound_sender(&self) -> mpsc::UnboundedSender<InboundMessage> {
        self.inbound_tx.clone()
    }

    /// Returns a clone of the outbound message sender.
    pub fn outbound_sender(&self) -> mpsc::UnboundedSender<OutboundMessage> {
        self.outbound_tx.clone()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    /// Clones the message bus, sharing the same underlying queues.
    fn clone(&self) -> Self {
        Self {
            inbound_tx: self.inbound_tx.clone(),
            inbound_rx: Arc::clone(&self.inbound_rx),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: Arc::clone(&self.outbound_rx),
        }
    }
}
