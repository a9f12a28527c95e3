//! # Event Channel
//!
//! Host → UI notifications: named payloads with no correlation id and no reply.
//!
//! Every outbound frame (replies, events and the final close) goes through one
//! queue drained by a single writer task, so events emitted one after another
//! reach the UI in that order. Emission only hands the encoded frame to the
//! queue; it never waits on the transport.

use std::sync::Arc;
use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use bindwire::EventMessage;
use bindwire::Frame;
use bindwire::Value;

use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No transport is attached, or the bridge has closed. Nothing is buffered.
    #[error("event channel unavailable")]
    ChannelUnavailable,
    /// The payload cannot be represented as a value.
    #[error("event payload: {0}")]
    Payload(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A frame queued for the writer task.
#[derive(Debug)]
pub(crate) enum Outgoing {
    Frame(Vec<u8>),
    /// Written last; the writer stops afterwards.
    Last(Vec<u8>),
}

pub(crate) type Outbound = mpsc::UnboundedSender<Outgoing>;

/// Spawns the single writer that owns the sending half of the transport.
pub(crate) fn spawn_writer(transport: Arc<dyn Transport>) -> (Outbound, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();

    let handle = tokio::spawn(async move {
        while let Some(outgoing) = rx.recv().await {
            let (bytes, last) = match outgoing {
                Outgoing::Frame(bytes) => (bytes, false),
                Outgoing::Last(bytes) => (bytes, true),
            };
            if let Err(e) = transport.send(&bytes).await {
                tracing::error!(error = %e, "outbound write failed, writer stopping");
                break;
            }
            if last {
                break;
            }
        }
    });

    (tx, handle)
}

/// Handle for pushing events to the UI surface.
///
/// Clone it freely, including into bound objects, so methods can emit while
/// they run.
#[derive(Clone, Default)]
pub struct EventChannel {
    link: Arc<RwLock<Option<Outbound>>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&self, outbound: Outbound) {
        let mut link = self.link.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *link = Some(outbound);
    }

    pub(crate) fn detach(&self) {
        let mut link = self.link.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *link = None;
    }

    pub fn is_available(&self) -> bool {
        let link = self.link.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        link.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Emits `event` with any serializable payload.
    pub fn emit<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> Result<()> {
        let payload = Value::from_serialize(payload).map_err(|e| Error::Payload(e.to_string()))?;
        self.emit_value(event, payload)
    }

    pub fn emit_value(&self, event: &str, payload: Value) -> Result<()> {
        let bytes = Frame::Event(EventMessage::new(event, payload))
            .encode()
            .map_err(|e| Error::Payload(e.to_string()))?;

        let link = self.link.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(tx) = link.as_ref() else {
            tracing::warn!(event, "event dropped: channel not attached");
            return Err(Error::ChannelUnavailable);
        };
        tx.send(Outgoing::Frame(bytes)).map_err(|_| {
            tracing::warn!(event, "event dropped: writer stopped");
            Error::ChannelUnavailable
        })
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel").field("available", &self.is_available()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelTransport;

    #[tokio::test]
    async fn test_unattached_channel_refuses() {
        let events = EventChannel::new();
        assert!(!events.is_available());
        assert_eq!(events.emit("progress", &42), Err(Error::ChannelUnavailable));
    }

    #[tokio::test]
    async fn test_emitted_in_order() {
        let (host, ui) = ChannelTransport::pair();
        let (outbound, writer) = spawn_writer(Arc::new(host));
        let events = EventChannel::new();
        events.attach(outbound);

        for i in 0..5 {
            events.emit("tick", &i).unwrap();
        }
        events.detach();
        assert_eq!(events.emit("tick", &5), Err(Error::ChannelUnavailable));

        for i in 0..5i64 {
            let frame = Frame::decode(&ui.recv().await.unwrap().unwrap()).unwrap();
            assert_eq!(frame, Frame::Event(EventMessage::new("tick", Value::Int(i))));
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_unrepresentable_payload() {
        use std::collections::HashMap;

        let events = EventChannel::new();
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);
        assert!(matches!(events.emit("bad", &bad), Err(Error::Payload(_))));
    }
}
