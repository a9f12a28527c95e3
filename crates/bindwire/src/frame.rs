//! # Protocol Frames
//!
//! Defines the JSON envelope exchanged over the transport. One transport
//! message carries exactly one frame; the `type` field tells them apart.
//!
//! ```text
//! {"type":"call","correlationId":1,"qualifier":"math","method":"add","args":[2,3]}
//! {"type":"reply","correlationId":1,"ok":true,"value":5}
//! {"type":"reply","correlationId":2,"ok":false,"error":{"kind":"ArgumentTypeError","message":"...","index":0}}
//! {"type":"event","event":"progress","payload":42}
//! {"type":"close"}
//! ```
//!
//! ## Invariants
//! - **Panic Safety**: decoding returns `Result`, never panicking on unknown data.
//! - **Forward Compatibility**: unknown fields are ignored.
//! - A reply is either `ok` with a `value` or not `ok` with an `error`, never both.

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Failure;
use crate::error::Result;
use crate::value::Value;

/// One message on the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// UI → host: invoke a bound method.
    Call(CallRequest),
    /// Host → UI: the outcome of exactly one call.
    Reply(CallResponse),
    /// Host → UI: a fire-and-forget event.
    Event(EventMessage),
    /// Host → UI: the bridge is shutting down; nothing follows.
    Close,
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Frame> {
        serde_json::from_slice(bytes).map_err(Error::Decode)
    }
}

/// A request to invoke `qualifier.method(args...)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub correlation_id: u64,
    pub qualifier: String,
    pub method: String,
    pub args: Vec<Value>,
}

impl CallRequest {
    pub fn new(
        correlation_id: u64,
        qualifier: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            correlation_id,
            qualifier: qualifier.into(),
            method: method.into(),
            args,
        }
    }
}

/// The result of a call: the returned value or a failure descriptor.
pub type Outcome = std::result::Result<Value, Failure>;

/// The reply to exactly one [`CallRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "ReplyWire", try_from = "ReplyWire")]
pub struct CallResponse {
    pub correlation_id: u64,
    pub outcome: Outcome,
}

impl CallResponse {
    pub fn ok(correlation_id: u64, value: Value) -> Self {
        Self { correlation_id, outcome: Ok(value) }
    }

    pub fn err(correlation_id: u64, failure: Failure) -> Self {
        Self { correlation_id, outcome: Err(failure) }
    }
}

/// Flat wire shape of a reply, `{correlationId, ok, value | error}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyWire {
    correlation_id: u64,
    ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<Failure>,
}

impl From<CallResponse> for ReplyWire {
    fn from(resp: CallResponse) -> Self {
        match resp.outcome {
            Ok(value) => ReplyWire {
                correlation_id: resp.correlation_id,
                ok: true,
                value: Some(value),
                error: None,
            },
            Err(failure) => ReplyWire {
                correlation_id: resp.correlation_id,
                ok: false,
                value: None,
                error: Some(failure),
            },
        }
    }
}

impl TryFrom<ReplyWire> for CallResponse {
    type Error = String;

    fn try_from(wire: ReplyWire) -> std::result::Result<Self, Self::Error> {
        let outcome = match (wire.ok, wire.value, wire.error) {
            (true, _, Some(_)) => return Err("reply marked ok carries an error".into()),
            // A JSON null value decodes as `None`.
            (true, value, None) => Ok(value.unwrap_or(Value::Null)),
            (false, _, Some(failure)) => Err(failure),
            (false, _, None) => return Err("reply marked failed carries no error".into()),
        };
        Ok(CallResponse { correlation_id: wire.correlation_id, outcome })
    }
}

/// A named, payload-bearing message pushed by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl EventMessage {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self { event: event.into(), payload }
    }
}

/// Extracts the correlation id from bytes that failed to decode as a frame.
///
/// Returns `None` when the bytes are not JSON at all or carry no usable id.
pub fn recover_correlation_id(bytes: &[u8]) -> Option<u64> {
    let raw: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    raw.get("correlationId")?.as_u64()
}
