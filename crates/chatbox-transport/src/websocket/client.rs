//! WebSocket client connection.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use chatbox_core::{
    BoxedConnection, Connection, ConnectionHandle, Connector, OutboundFrame, OutboundReceiver,
    Received, TransportError, TransportResult,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Opens WebSocket connections to a fixed URL.
///
/// The URL usually embeds the secret token as its last path segment, so it
/// is never logged; [`Connector::describe`] shows a redacted form.
#[derive(Clone)]
pub struct WsConnector {
    url: String,
    redacted: String,
}

impl WsConnector {
    /// Creates a connector for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let redacted = redact(&url);
        Self { url, redacted }
    }
}

impl std::fmt::Debug for WsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnector")
            .field("url", &self.redacted)
            .finish()
    }
}

/// Replaces everything after the last `/` with `***`.
pub fn redact(url: &str) -> String {
    match url.rfind('/') {
        Some(idx) if idx + 1 < url.len() && !url[..idx].ends_with('/') => {
            format!("{}***", &url[..=idx])
        }
        _ => url.to_string(),
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> TransportResult<BoxedConnection> {
        info!(url = %self.redacted, "Connecting to WebSocket server");

        let (stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| match e {
            tungstenite::Error::Http(response) => TransportError::InvalidStatus {
                status: response.status().as_u16(),
            },
            other => TransportError::ConnectionFailed {
                url: self.redacted.clone(),
                reason: other.to_string(),
            },
        })?;

        info!(url = %self.redacted, "WebSocket client connected");
        Ok(Box::new(WsConnection::new(stream)))
    }

    fn describe(&self) -> String {
        self.redacted.clone()
    }
}

/// An open WebSocket connection.
pub struct WsConnection {
    sink: WsSink,
    source: WsSource,
    handle: ConnectionHandle,
    outbound: OutboundReceiver,
}

impl WsConnection {
    fn new(stream: WsStream) -> Self {
        let (sink, source) = stream.split();
        let (handle, outbound) = ConnectionHandle::channel();
        Self {
            sink,
            source,
            handle,
            outbound,
        }
    }

    async fn write(&mut self, frame: OutboundFrame) -> TransportResult<()> {
        let text = frame
            .to_text()
            .map_err(|e| TransportError::SendFailed(format!("JSON serialization failed: {e}")))?;
        trace!(len = text.len(), "Sending text");
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn recv(&mut self, wait: Duration) -> TransportResult<Received> {
        let deadline = sleep_until(Instant::now() + wait);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                Some(frame) = self.outbound.recv() => {
                    self.write(frame).await?;
                }

                msg = self.source.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "Received text");
                            return Ok(Received::Frame(text.to_string()));
                        }
                        Some(Ok(Message::Binary(data))) => {
                            trace!(len = data.len(), "Received binary");
                            return Ok(Received::Frame(String::from_utf8_lossy(&data).into_owned()));
                        }
                        // tungstenite queues the pong itself.
                        Some(Ok(Message::Ping(_))) => trace!("Received ping"),
                        Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            let error = closed(frame);
                            info!(error = %error, "Server closed connection");
                            return Err(error);
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            return Err(match e {
                                tungstenite::Error::ConnectionClosed
                                | tungstenite::Error::AlreadyClosed => {
                                    TransportError::abnormal_close(e.to_string())
                                }
                                tungstenite::Error::Io(io) => {
                                    TransportError::abnormal_close(io.to_string())
                                }
                                other => TransportError::Io(other.to_string()),
                            });
                        }
                        None => {
                            info!("WebSocket stream ended");
                            return Err(TransportError::abnormal_close("stream ended"));
                        }
                    }
                }

                _ = &mut deadline => return Ok(Received::Idle),
            }
        }
    }

    fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    async fn close(&mut self) {
        while let Ok(frame) = self.outbound.try_recv() {
            if self.write(frame).await.is_err() {
                break;
            }
        }
        if let Err(e) = self.sink.close().await {
            debug!(error = %e, "Error while closing WebSocket");
        }
    }
}

fn closed(frame: Option<CloseFrame>) -> TransportError {
    match frame {
        Some(frame) => TransportError::Closed {
            code: u16::from(frame.code),
            reason: frame.reason.to_string(),
        },
        None => TransportError::Closed {
            code: 1005,
            reason: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[test]
    fn test_redact_hides_token() {
        assert_eq!(
            redact("wss://chat.sc3.io/v2/secret-token"),
            "wss://chat.sc3.io/v2/***"
        );
        assert_eq!(redact("wss://chat.sc3.io/v2/"), "wss://chat.sc3.io/v2/");
        assert_eq!(redact("ws://localhost"), "ws://localhost");
    }

    #[tokio::test]
    async fn test_frames_idle_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"type":"hello","ok":true}"#.into()))
                .await
                .unwrap();
            // Wait for the client's tell, then close normally.
            let echoed = loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => break text.to_string(),
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected: {other:?}"),
                }
            };
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            }))
            .await
            .unwrap();
            echoed
        });

        let connector = WsConnector::new(format!("ws://{addr}/token"));
        let mut conn = connector.connect().await.unwrap();

        let first = conn.recv(Duration::from_secs(5)).await.unwrap();
        assert_eq!(first, Received::Frame(r#"{"type":"hello","ok":true}"#.into()));

        conn.handle().tell("alice", "bot", "hi").unwrap();
        let err = loop {
            match conn.recv(Duration::from_millis(50)).await {
                Ok(Received::Idle) => continue,
                Ok(other) => panic!("unexpected frame: {other:?}"),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, TransportError::Closed { code: 1000, .. }));

        let echoed = server.await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&echoed).unwrap();
        assert_eq!(value["type"], "tell");
        assert_eq!(value["user"], "alice");
    }

    #[tokio::test]
    async fn test_ping_is_answered_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Ping(vec![7u8, 7].into())).await.unwrap();
            // Count pongs until the client's tell arrives.
            let mut pongs = 0;
            loop {
                match ws.next().await {
                    Some(Ok(Message::Pong(data))) => {
                        assert_eq!(&data[..], &[7u8, 7]);
                        pongs += 1;
                    }
                    Some(Ok(Message::Text(_))) => break,
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected: {other:?}"),
                }
            }
            let _ = ws.close(None).await;
            pongs
        });

        let mut conn = WsConnector::new(format!("ws://{addr}/token"))
            .connect()
            .await
            .unwrap();
        assert_eq!(
            conn.recv(Duration::from_millis(200)).await.unwrap(),
            Received::Idle
        );
        conn.handle().tell("alice", "bot", "hi").unwrap();
        loop {
            match conn.recv(Duration::from_millis(50)).await {
                Ok(Received::Idle) => continue,
                Ok(other) => panic!("unexpected frame: {other:?}"),
                Err(_) => break,
            }
        }

        assert_eq!(server.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refused_upgrade_is_invalid_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut tcp, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = tcp.read(&mut buf).await;
            let _ = tcp
                .write_all(b"HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\n\r\n")
                .await;
        });

        let err = WsConnector::new(format!("ws://{addr}/bad"))
            .connect()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::InvalidStatus { status: 401 }));
    }
}
