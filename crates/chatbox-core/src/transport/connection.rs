//! Connection seams and the outbound handle.
//!
//! The engine never touches a socket directly. It drives a [`Connection`]
//! obtained from a [`Connector`], and hands handlers and jobs a cloneable
//! [`ConnectionHandle`] through which they enqueue [`OutboundFrame`]s. The
//! connection drains that queue while it waits for inbound frames, so
//! nothing blocks the single session loop.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{TransportError, TransportResult};
use crate::foundation::frame::OutboundFrame;

/// Result of one bounded-wait receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// One inbound text frame.
    Frame(String),
    /// The wait expired with no inbound frame.
    Idle,
}

/// An open connection to the chat service.
#[async_trait]
pub trait Connection: Send {
    /// Waits at most `wait` for the next inbound frame.
    ///
    /// Frames queued on [`Connection::handle`] are written while waiting.
    /// A closure of any kind is reported as [`TransportError::Closed`].
    async fn recv(&mut self, wait: Duration) -> TransportResult<Received>;

    /// Returns a handle for enqueueing outbound frames.
    fn handle(&self) -> ConnectionHandle;

    /// Closes the connection. Errors are ignored.
    async fn close(&mut self) {}
}

/// Boxed connection.
pub type BoxedConnection = Box<dyn Connection>;

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a fresh connection.
    async fn connect(&self) -> TransportResult<BoxedConnection>;

    /// Endpoint description for logs. Must not contain secrets.
    fn describe(&self) -> String {
        "connector".to_string()
    }
}

/// Receiving half of an outbound queue, owned by a [`Connection`].
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundFrame>;

/// Handle to the outbound side of a connection.
///
/// Cloning is cheap. The queue is unbounded: handlers run inside the same
/// loop that drains it, so a bounded queue could never make progress once
/// full.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl ConnectionHandle {
    /// Creates a handle and the receiving half its connection drains.
    pub fn channel() -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueues a frame.
    ///
    /// Fails with [`TransportError::SendFailed`] once the connection is gone.
    pub fn send(&self, frame: OutboundFrame) -> TransportResult<()> {
        self.tx
            .send(frame)
            .map_err(|_| TransportError::SendFailed("connection is closed".into()))
    }

    /// Sends a format-mode `tell`.
    pub fn tell(
        &self,
        user: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> TransportResult<()> {
        self.send(OutboundFrame::tell(user, name, text))
    }

    /// Whether the owning connection has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_arrive_in_order() {
        let (handle, mut rx) = ConnectionHandle::channel();
        handle.tell("a", "bot", "one").unwrap();
        handle.clone().tell("a", "bot", "two").unwrap();

        let texts: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|frame| match frame {
                OutboundFrame::Tell { text, .. } => text,
            })
            .collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_send_after_close_fails() {
        let (handle, rx) = ConnectionHandle::channel();
        drop(rx);
        assert!(handle.is_closed());
        assert!(matches!(
            handle.tell("a", "bot", "late"),
            Err(TransportError::SendFailed(_))
        ));
    }
}
