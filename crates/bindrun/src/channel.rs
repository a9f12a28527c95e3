//! In-process transport over tokio channels.
//!
//! Host glue that talks to a webview through callbacks (an IPC handler on one
//! side, an `evaluate_script` style call on the other) keeps one end of a
//! [`ChannelTransport::pair`] and shuttles messages between it and the UI
//! surface. Tests use the pair directly.

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Transport;

/// One end of an in-process duplex link.
///
/// Messages sent via `send()` appear on the peer's `recv()` and vice versa.
/// `recv()` reports the end of the stream once every handle to the peer's
/// sending side has been dropped.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl ChannelTransport {
    /// Wraps an outgoing sender and an incoming receiver.
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>, rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Two connected ends, conventionally `(host, ui)`.
    pub fn pair() -> (Self, Self) {
        let (to_ui, from_host) = mpsc::unbounded_channel();
        let (to_host, from_ui) = mpsc::unbounded_channel();

        (Self::new(to_ui, from_ui), Self::new(to_host, from_host))
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        self.tx
            .send(payload.to_vec())
            .map_err(|_| transport::Error::ConnectionLost("channel closed".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        Ok(self.rx.lock().await.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_is_crossed() {
        let (a, b) = ChannelTransport::pair();

        a.send(b"ping").await.unwrap();
        b.send(b"pong").await.unwrap();

        assert_eq!(b.recv().await.unwrap().as_deref(), Some(&b"ping"[..]));
        assert_eq!(a.recv().await.unwrap().as_deref(), Some(&b"pong"[..]));
    }

    #[tokio::test]
    async fn test_drop_ends_peer_stream() {
        let (a, b) = ChannelTransport::pair();
        drop(a);

        assert_eq!(b.recv().await.unwrap(), None);
        assert!(b.send(b"late").await.is_err());
    }
}
