//! # Bridge Lifecycle
//!
//! Wires registry, dispatcher and event channel to one transport and walks
//! them through `Unstarted → Registering → Ready → Running → Closed`.
//!
//! - **Unstarted**: a [`BridgeBuilder`] collecting objects, hooks and config.
//! - **Registering**: [`BridgeBuilder::build`] validated the bound set; the
//!   catalog exists but nothing is listening.
//! - **Ready**: [`Bridge::attach`] connected a transport. Calls are accepted
//!   and events can be emitted from here on.
//! - **Running**: [`Bridge::start`] ran the before-start hooks and told the UI
//!   surface to load.
//! - **Closed**: [`Bridge::close`] ran the on-close hooks, answered every
//!   outstanding call with `BridgeClosed`, sent the close frame and let go of
//!   the transport.
//!
//! ## Invariants
//!
//! - Every accepted call gets exactly one reply, either its own outcome or
//!   `BridgeClosed`; the close frame is the last thing written.
//! - Accepting a frame never waits on a native call.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::task::AbortHandle;
use tokio::task::JoinHandle;

use bindwire::CallResponse;
use bindwire::Failure;
use bindwire::Frame;

use crate::bind::Bindable;
use crate::config::BridgeConfig;
use crate::dispatch::Dispatcher;
use crate::events::EventChannel;
use crate::events::Outbound;
use crate::events::Outgoing;
use crate::events::spawn_writer;
use crate::registry;
use crate::registry::Catalog;
use crate::registry::Registry;
use crate::transport::Transport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Unstarted,
    Registering,
    Ready,
    Running,
    Closed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Unstarted => "unstarted",
            State::Registering => "registering",
            State::Ready => "ready",
            State::Running => "running",
            State::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The bound set was rejected. Fatal to startup.
    #[error("registration failed: {0}")]
    Registration(#[from] registry::Error),
    #[error("cannot move bridge from {from} to {to}")]
    InvalidTransition { from: State, to: State },
    /// The UI surface failed to load.
    #[error("UI surface failed: {0}")]
    Surface(String),
    #[error("cannot write catalog manifest to {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The UI side as the lifecycle sees it: something that loads and later
/// reports that it went away.
#[async_trait::async_trait]
pub trait Surface: Send + Sync {
    /// Loads the UI. Called once the bridge is live.
    async fn load(&self) -> anyhow::Result<()>;

    /// Resolves when the user (or the platform) closes the UI.
    async fn closed(&self);
}

type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Collects everything a bridge needs before registration.
pub struct BridgeBuilder {
    config: BridgeConfig,
    objects: Vec<Arc<dyn Bindable>>,
    before_start: Vec<Hook>,
    on_close: Vec<Hook>,
    events: EventChannel,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            objects: Vec::new(),
            before_start: Vec::new(),
            on_close: Vec::new(),
            events: EventChannel::new(),
        }
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(self, object: impl Bindable) -> Self {
        self.bind_arc(Arc::new(object))
    }

    pub fn bind_arc(mut self, object: Arc<dyn Bindable>) -> Self {
        self.objects.push(object);
        self
    }

    /// Runs after the transport is attached, right before the UI loads.
    pub fn before_start(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.before_start.push(Box::new(hook));
        self
    }

    /// Runs when the bridge closes, before outstanding calls are cancelled.
    pub fn on_close(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close.push(Box::new(hook));
        self
    }

    /// The channel the built bridge will emit on.
    ///
    /// Hand clones to bound objects that push events.
    pub fn events(&self) -> EventChannel {
        self.events.clone()
    }

    /// Registers the bound set.
    pub fn build(self) -> Result<Bridge> {
        let registry = Registry::build(self.objects)?;

        if let Some(path) = &self.config.manifest_path {
            write_manifest(path, registry.catalog())?;
        }

        tracing::info!(
            objects = registry.catalog().objects.len(),
            state = %State::Registering,
            "bridge registered"
        );

        let dispatcher = Dispatcher::new(registry).with_limit(self.config.max_concurrent_calls);
        Ok(Bridge {
            config: self.config,
            dispatcher,
            events: self.events,
            state: Mutex::new(State::Registering),
            before_start: Mutex::new(self.before_start),
            on_close: Mutex::new(self.on_close),
            link: Mutex::new(None),
        })
    }
}

fn write_manifest(path: &Path, catalog: &Catalog) -> Result<()> {
    let text = catalog.to_manifest()?;
    let io_error = |source| Error::Manifest { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, text).map_err(io_error)?;
    tracing::debug!(path = %path.display(), "catalog manifest written");
    Ok(())
}

struct InFlight {
    correlation_id: u64,
    task: Option<AbortHandle>,
}

/// Serializes every reply with shutdown, so nothing is written after the
/// close frame and no call is answered twice.
struct Replies {
    outbound: Outbound,
    /// Keyed by an internal ticket; `None` once closed.
    in_flight: Mutex<Option<HashMap<u64, InFlight>>>,
}

impl Replies {
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<HashMap<u64, InFlight>>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, response: CallResponse) {
        let id = response.correlation_id;
        match Frame::Reply(response).encode() {
            Ok(bytes) => {
                if self.outbound.send(Outgoing::Frame(bytes)).is_err() {
                    tracing::warn!(id, "reply dropped: writer stopped");
                }
            }
            Err(e) => tracing::error!(id, error = %e, "reply could not be encoded"),
        }
    }

    /// Writes a reply that belongs to no in-flight call.
    fn reject(&self, response: CallResponse) {
        let guard = self.lock();
        if guard.is_some() {
            self.write(response);
        }
    }

    fn begin(&self, ticket: u64, correlation_id: u64) -> bool {
        match self.lock().as_mut() {
            Some(in_flight) => {
                in_flight.insert(ticket, InFlight { correlation_id, task: None });
                true
            }
            None => false,
        }
    }

    fn track(&self, ticket: u64, task: AbortHandle) {
        if let Some(entry) = self.lock().as_mut().and_then(|m| m.get_mut(&ticket)) {
            entry.task = Some(task);
        }
    }

    /// Writes the reply unless shutdown already answered this call.
    fn finish(&self, ticket: u64, response: CallResponse) {
        let mut guard = self.lock();
        if guard.as_mut().and_then(|m| m.remove(&ticket)).is_some() {
            self.write(response);
        }
    }

    /// Answers everything outstanding with `BridgeClosed`, then queues the
    /// close frame. Returns the number of cancelled calls.
    fn shut(&self) -> usize {
        let mut guard = self.lock();
        let Some(in_flight) = guard.take() else {
            return 0;
        };

        let mut cancelled: Vec<InFlight> = in_flight.into_values().collect();
        cancelled.sort_by_key(|c| c.correlation_id);
        for call in &cancelled {
            if let Some(task) = &call.task {
                task.abort();
            }
            self.write(CallResponse::err(call.correlation_id, Failure::bridge_closed()));
        }

        match Frame::Close.encode() {
            Ok(bytes) => {
                let _ = self.outbound.send(Outgoing::Last(bytes));
            }
            Err(e) => tracing::error!(error = %e, "close frame could not be encoded"),
        }
        cancelled.len()
    }
}

struct Link {
    replies: Arc<Replies>,
    pump: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// A registered bridge. See the module docs for its lifecycle.
pub struct Bridge {
    config: BridgeConfig,
    dispatcher: Dispatcher,
    events: EventChannel,
    state: Mutex<State>,
    before_start: Mutex<Vec<Hook>>,
    on_close: Mutex<Vec<Hook>>,
    link: Mutex<Option<Link>>,
}

impl Bridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    pub fn state(&self) -> State {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.dispatcher.catalog()
    }

    pub fn events(&self) -> EventChannel {
        self.events.clone()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn advance(&self, from: State, to: State) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *state != from {
            return Err(Error::InvalidTransition { from: *state, to });
        }
        *state = to;
        tracing::info!(%from, %to, "bridge state changed");
        Ok(())
    }

    /// Connects the transport. From here on calls are served and events flow.
    pub fn attach(&self, transport: impl Transport) -> Result<()> {
        self.attach_arc(Arc::new(transport))
    }

    pub fn attach_arc(&self, transport: Arc<dyn Transport>) -> Result<()> {
        self.advance(State::Registering, State::Ready)?;

        let (outbound, writer) = spawn_writer(transport.clone());
        let replies = Arc::new(Replies {
            outbound: outbound.clone(),
            in_flight: Mutex::new(Some(HashMap::new())),
        });
        let pump = tokio::spawn(pump(transport, self.dispatcher.clone(), replies.clone()));

        self.events.attach(outbound);
        *self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Link { replies, pump, writer });
        Ok(())
    }

    /// Runs the before-start hooks and loads the UI surface.
    ///
    /// If the surface fails to load the bridge is closed.
    pub async fn start(&self, surface: &dyn Surface) -> Result<()> {
        self.advance(State::Ready, State::Running)?;

        let hooks = std::mem::take(&mut *self.before_start.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
        for hook in hooks {
            hook();
        }

        if let Err(e) = surface.load().await {
            tracing::error!(error = %e, "UI surface failed to load");
            self.close().await;
            return Err(Error::Surface(format!("{:#}", e)));
        }
        Ok(())
    }

    /// Shuts the bridge down. Safe to call more than once and from any state.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if *state == State::Closed {
                return;
            }
            tracing::info!(from = %*state, to = %State::Closed, "bridge closing");
            *state = State::Closed;
        }

        let hooks = std::mem::take(&mut *self.on_close.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
        for hook in hooks {
            hook();
        }

        self.events.detach();

        let link = self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        let Some(Link { replies, pump, mut writer }) = link else {
            return;
        };

        pump.abort();
        let cancelled = replies.shut();
        if cancelled > 0 {
            tracing::info!(cancelled, "answered outstanding calls with BridgeClosed");
        }
        drop(replies);

        if tokio::time::timeout(self.config.shutdown_grace, &mut writer).await.is_err() {
            tracing::warn!("close frame not flushed within the shutdown grace period");
            writer.abort();
        }
    }

    /// Attaches, starts, waits for the surface to close, then closes.
    pub async fn run(&self, transport: impl Transport, surface: &dyn Surface) -> Result<()> {
        self.attach(transport)?;
        self.start(surface).await?;
        surface.closed().await;
        self.close().await;
        Ok(())
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        let link = self.link.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(link) = link {
            link.pump.abort();
            link.writer.abort();
        }
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("objects", &self.catalog().objects.len())
            .finish()
    }
}

/// Reads frames and spawns one task per call.
async fn pump(transport: Arc<dyn Transport>, dispatcher: Dispatcher, replies: Arc<Replies>) {
    let mut next_ticket: u64 = 0;

    loop {
        let msg = match transport.recv().await {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                tracing::info!("UI transport ended");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "transport error in bridge pump");
                break;
            }
        };

        let call = match Dispatcher::accept(&msg) {
            Ok(call) => call,
            Err(rejected) => {
                replies.reject(rejected);
                continue;
            }
        };

        next_ticket += 1;
        let ticket = next_ticket;
        if !replies.begin(ticket, call.correlation_id) {
            break;
        }

        let task = {
            let dispatcher = dispatcher.clone();
            let replies = replies.clone();
            tokio::spawn(async move {
                let response = dispatcher.handle(call).await;
                replies.finish(ticket, response);
            })
        };
        replies.track(ticket, task.abort_handle());
    }
}
