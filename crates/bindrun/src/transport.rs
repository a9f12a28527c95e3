//! # Transport Abstraction
//!
//! A minimal, async interface for moving bytes between the host and the UI
//! surface.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about frames, values or
//!   methods. It moves opaque buffers.
//! - **Message-Oriented**: One `send` is one message; `recv` yields whole
//!   messages in the order the peer sent them.
//! - **Full-Duplex**: Sending and receiving happen on separate tasks, so a
//!   transport must tolerate a `send` racing a pending `recv`.

/// Errors that occur at the transport layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A bidirectional message channel.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one message to the peer.
    ///
    /// # invariants
    /// - Must not interpret the payload content.
    /// - Messages sent sequentially from one task arrive in that order.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Waits for the next message from the peer.
    ///
    /// Returns `Ok(None)` once the peer has closed its side for good.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;
}
