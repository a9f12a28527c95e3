//! # Bridge Client with Async Pump
//!
//! The UI side of the bridge, written in Rust: what the generated stubs do in
//! the browser, this does for tests, headless UIs and native front-ends.
//!
//! A background pump reads the transport and demultiplexes frames: replies go
//! to the pending call with the matching correlation id, events go to the
//! subscribed handlers, and a close frame (or the end of the stream) fails
//! every call still pending with `BridgeClosed`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use bindwire::CallRequest;
use bindwire::CallResponse;
use bindwire::Failure;
use bindwire::FailureKind;
use bindwire::Frame;
use bindwire::Value;

use crate::config::BridgeConfig;
use crate::config::DEFAULT_CALL_TIMEOUT;
use crate::transport;
use crate::transport::Transport;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] transport::Error),
    #[error("wire error: {0}")]
    Wire(String),
    /// The host answered with a failure.
    #[error("remote failure: {0}")]
    Remote(Failure),
    #[error("call timed out")]
    Timeout,
}

impl Error {
    /// The failure kind, when the host (or shutdown) produced this error.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Remote(failure) => Some(failure.kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

type Listener = Arc<dyn Fn(&Value) + Send + Sync>;
type Listeners = Mutex<HashMap<String, Vec<(u64, Listener)>>>;

/// Returned by [`Client::on`]; pass it to [`Client::off`] to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    event: String,
    id: u64,
}

struct Shared {
    pending: DashMap<u64, oneshot::Sender<Result<Value>>>,
    listeners: Listeners,
    closed: AtomicBool,
}

impl Shared {
    /// Marks the client closed and fails everything still waiting.
    fn shut(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let keys: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, tx)) = self.pending.remove(&key) {
                let _ = tx.send(Err(Error::Remote(Failure::bridge_closed())));
            }
        }
    }

    fn deliver(&self, event: &str, payload: &Value) {
        // Snapshot first so handlers may subscribe or unsubscribe.
        let handlers: Vec<Listener> = {
            let listeners = self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match listeners.get(event) {
                Some(subs) => subs.iter().map(|(_, h)| h.clone()).collect(),
                None => return,
            }
        };
        for handler in handlers {
            handler(payload);
        }
    }

    fn handle_message(&self, msg: &[u8]) -> Result<bool> {
        let frame = Frame::decode(msg).map_err(|e| Error::Wire(e.to_string()))?;

        match frame {
            Frame::Reply(CallResponse { correlation_id, outcome }) => {
                let Some((_, tx)) = self.pending.remove(&correlation_id) else {
                    // Late reply to a call that already timed out.
                    tracing::debug!(id = correlation_id, "reply without a pending call");
                    return Ok(true);
                };
                let _ = tx.send(outcome.map_err(Error::Remote));
                Ok(true)
            }
            Frame::Event(event) => {
                self.deliver(&event.event, &event.payload);
                Ok(true)
            }
            Frame::Close => Ok(false),
            Frame::Call(call) => Err(Error::Wire(format!(
                "unexpected call frame for '{}.{}'",
                call.qualifier, call.method
            ))),
        }
    }
}

/// Issues calls to a bridge and receives its events.
///
/// Correlation ids start at 1 and are never reused by one client.
pub struct Client {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    next_subscription: AtomicU64,
    timeout: Option<Duration>,
    pump: JoinHandle<()>,
}

impl Client {
    /// Creates a client and spawns the background pump task.
    pub fn new(transport: impl Transport) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        let shared = Arc::new(Shared {
            pending: DashMap::new(),
            listeners: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        let pump_transport = transport.clone();
        let pump_shared = shared.clone();
        let pump = tokio::spawn(async move {
            loop {
                match pump_transport.recv().await {
                    Ok(Some(msg)) => match pump_shared.handle_message(&msg) {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::debug!("bridge sent close");
                            break;
                        }
                        Err(e) => tracing::warn!(error = %e, "ignoring bad frame"),
                    },
                    Ok(None) => {
                        tracing::debug!("transport ended");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "transport error in client pump");
                        break;
                    }
                }
            }
            pump_shared.shut();
        });

        Self {
            transport,
            shared,
            next_id: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
            timeout: Some(DEFAULT_CALL_TIMEOUT),
            pump,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_config(self, config: &BridgeConfig) -> Self {
        self.with_timeout(config.call_timeout)
    }

    /// True once the bridge has closed or the transport has ended.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Calls `qualifier.method(args...)` and waits for its reply.
    pub async fn call(&self, qualifier: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(id, tx);

        // The pump may have shut between the id allocation and the insert.
        if self.is_closed() {
            self.shared.pending.remove(&id);
            return Err(Error::Remote(Failure::bridge_closed()));
        }

        let payload = Frame::Call(CallRequest::new(id, qualifier, method, args))
            .encode()
            .map_err(|e| Error::Wire(e.to_string()));
        let sent = match payload {
            Ok(bytes) => self.transport.send(&bytes).await.map_err(Error::from),
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            self.shared.pending.remove(&id);
            return Err(e);
        }

        let reply = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.shared.pending.remove(&id);
                    return Err(Error::Timeout);
                }
            },
            None => rx.await,
        };

        // A dropped sender means the pump is gone.
        reply.unwrap_or_else(|_| Err(Error::Remote(Failure::bridge_closed())))
    }

    /// Subscribes `handler` to `event`. Handlers run in subscription order.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.shared.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.entry(event.to_string()).or_default().push((id, Arc::new(handler)));
        Subscription { event: event.to_string(), id }
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn off(&self, subscription: &Subscription) -> bool {
        let mut listeners = self.shared.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(subs) = listeners.get_mut(&subscription.event) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(id, _)| *id != subscription.id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            listeners.remove(&subscription.event);
        }
        removed
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
