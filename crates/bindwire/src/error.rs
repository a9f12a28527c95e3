//! # Error Definitions
//!
//! Codec failures on one side, and on the other the failure descriptors a
//! reply carries back to the call site that made the request.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::kind::CoerceError;

/// Failures of the frame codec itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The frame could not be serialized.
    #[error("frame could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
    /// The bytes are not a well-formed frame.
    #[error("frame could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A specialized Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of a runtime failure reported in a reply.
///
/// These are distinct from [`Error`]: they describe why the *host* refused or
/// failed a call, not why bytes could not be moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The request bytes were not a valid call frame.
    MalformedRequest,
    /// No object is bound under the requested qualifier.
    UnknownObject,
    /// The object has no method with this name and arity.
    UnknownMethod,
    /// An argument could not be coerced to its declared kind.
    ArgumentTypeError,
    /// The native method returned an error or panicked.
    InvocationError,
    /// The bridge shut down before the call completed.
    BridgeClosed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedRequest => "MalformedRequest",
            Self::UnknownObject => "UnknownObject",
            Self::UnknownMethod => "UnknownMethod",
            Self::ArgumentTypeError => "ArgumentTypeError",
            Self::InvocationError => "InvocationError",
            Self::BridgeClosed => "BridgeClosed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `error` side of a reply.
///
/// `index` is only present for [`FailureKind::ArgumentTypeError`] and names the
/// zero-based position of the offending argument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), index: None }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedRequest, message)
    }

    pub fn unknown_object(qualifier: &str) -> Self {
        Self::new(FailureKind::UnknownObject, format!("no object is bound as '{}'", qualifier))
    }

    pub fn unknown_method(qualifier: &str, method: &str, arity: usize) -> Self {
        Self::new(
            FailureKind::UnknownMethod,
            format!("'{}' has no method '{}' taking {} argument(s)", qualifier, method, arity),
        )
    }

    pub fn argument(index: usize, err: &CoerceError) -> Self {
        Self {
            kind: FailureKind::ArgumentTypeError,
            message: format!("argument {}: {}", index, err),
            index: Some(index),
        }
    }

    pub fn invocation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvocationError, message)
    }

    pub fn bridge_closed() -> Self {
        Self::new(FailureKind::BridgeClosed, "bridge closed before the call completed")
    }
}
