//! # Call Dispatcher
//!
//! Turns one inbound call frame into exactly one reply.
//!
//! Every request walks `Received → Decoded → Resolved → Invoked → Responded`.
//! A failure at any stage short-circuits to `Responded` with a failure payload
//! for that call alone; nothing a request does can stop the dispatcher from
//! serving the next one.
//!
//! ## Invariants
//!
//! - Exactly one [`CallResponse`] per request, carrying the request's id.
//! - A method is only entered with the declared arity and with every argument
//!   coerced to its declared kind.
//! - Errors and panics inside a native method become `InvocationError`.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;

use bindwire::CallRequest;
use bindwire::CallResponse;
use bindwire::Failure;
use bindwire::Frame;
use bindwire::Value;
use bindwire::recover_correlation_id;

use crate::bind::Args;
use crate::registry::Catalog;
use crate::registry::Registry;

/// Correlation id used for failures whose request id could not be recovered.
///
/// Generated stubs allocate ids from 1, so 0 never matches a pending call.
pub const UNADDRESSED: u64 = 0;

/// Position of a request in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Received,
    Decoded,
    Resolved,
    Invoked,
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Decoded => "decoded",
            Stage::Resolved => "resolved",
            Stage::Invoked => "invoked",
            Stage::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// Resolves calls against a [`Registry`] and runs them.
///
/// Cheap to clone; the bridge hands one clone to every call task.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Registry,
    limiter: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self { registry, limiter: None }
    }

    /// Bounds the number of native calls executing at once.
    ///
    /// Requests beyond the bound wait for a permit after coercion; decoding
    /// and resolution are never held back.
    pub fn with_limit(mut self, max_concurrent_calls: Option<usize>) -> Self {
        self.limiter = max_concurrent_calls.map(|n| Arc::new(Semaphore::new(n.max(1))));
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.registry.catalog()
    }

    /// Decodes raw bytes into a call, or into the failure reply owed for them.
    pub fn accept(raw: &[u8]) -> Result<CallRequest, CallResponse> {
        let failure = match Frame::decode(raw) {
            Ok(Frame::Call(call)) => {
                tracing::trace!(id = call.correlation_id, stage = %Stage::Decoded, "request stage");
                return Ok(call);
            }
            Ok(other) => Failure::malformed(format!("expected a call frame, got {}", frame_name(&other))),
            Err(e) => Failure::malformed(e.to_string()),
        };

        let id = recover_correlation_id(raw).unwrap_or_else(|| {
            tracing::warn!("malformed frame without a recoverable correlation id");
            UNADDRESSED
        });
        tracing::warn!(id, error = %failure.message, "rejecting malformed frame");
        Err(CallResponse::err(id, failure))
    }

    /// Handles one raw request end to end.
    pub async fn dispatch(&self, raw: &[u8]) -> CallResponse {
        tracing::trace!(bytes = raw.len(), stage = %Stage::Received, "request stage");
        match Self::accept(raw) {
            Ok(call) => self.handle(call).await,
            Err(rejected) => rejected,
        }
    }

    /// Runs an already decoded call.
    pub async fn handle(&self, call: CallRequest) -> CallResponse {
        let id = call.correlation_id;
        tracing::debug!(id, qualifier = %call.qualifier, method = %call.method, "dispatching call");

        let response = match self.run(call).await {
            Ok(value) => CallResponse::ok(id, value),
            Err(failure) => {
                tracing::debug!(id, kind = %failure.kind, message = %failure.message, "call failed");
                CallResponse::err(id, failure)
            }
        };
        tracing::trace!(id, stage = %Stage::Responded, "request stage");
        response
    }

    async fn run(&self, call: CallRequest) -> Result<Value, Failure> {
        let CallRequest { correlation_id, qualifier, method, args } = call;
        let catalog: &Catalog = self.registry.catalog();

        let signature = catalog.resolve(&qualifier, &method, args.len())?;
        let object = self
            .registry
            .object(&qualifier)
            .ok_or_else(|| Failure::unknown_object(&qualifier))?;
        tracing::trace!(id = correlation_id, stage = %Stage::Resolved, "request stage");

        let mut coerced = Vec::with_capacity(args.len());
        for (index, (arg, param)) in args.into_iter().zip(&signature.params).enumerate() {
            let value = param
                .kind
                .coerce(arg, catalog)
                .map_err(|e| Failure::argument(index, &e))?;
            coerced.push(value);
        }

        let _permit = match &self.limiter {
            Some(limiter) => Some(
                limiter
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| Failure::bridge_closed())?,
            ),
            None => None,
        };

        let outcome = AssertUnwindSafe(object.invoke(&method, Args::new(coerced)))
            .catch_unwind()
            .await;
        tracing::trace!(id = correlation_id, stage = %Stage::Invoked, "request stage");

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return Err(Failure::invocation(e.message())),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(qualifier = %qualifier, method = %method, %message, "native method panicked");
                return Err(Failure::invocation(format!("native method panicked: {}", message)));
            }
        };

        signature.returns.coerce(value, catalog).map_err(|e| {
            Failure::invocation(format!("'{}.{}' returned an unexpected value: {}", qualifier, method, e))
        })
    }
}

fn frame_name(frame: &Frame) -> &'static str {
    match frame {
        Frame::Call(_) => "call",
        Frame::Reply(_) => "reply",
        Frame::Event(_) => "event",
        Frame::Close => "close",
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
