//! # Bindwire
//!
//! The message contract between a host process and the script running inside
//! its embedded UI surface.
//!
//! ## Architecture
//!
//! - [`value`]: the tagged-variant `Value` every argument, result and event
//!   payload is carried as.
//! - [`kind`]: declared parameter kinds and the coercion rules that map an
//!   incoming `Value` onto a declared kind.
//! - [`frame`]: the JSON envelope (call, reply, event, close) exchanged over
//!   the transport.
//! - [`error`]: codec errors and the failure descriptors carried by replies.
//!
//! Nothing here is async and nothing here knows about transports; the runtime
//! lives in `bindrun`.

pub mod error;
pub mod frame;
pub mod kind;
pub mod value;

pub use error::Error;
pub use error::Failure;
pub use error::FailureKind;
pub use error::Result;
pub use frame::CallRequest;
pub use frame::CallResponse;
pub use frame::EventMessage;
pub use frame::Frame;
pub use frame::Outcome;
pub use frame::recover_correlation_id;
pub use kind::CoerceError;
pub use kind::Field;
pub use kind::Kind;
pub use kind::Shapes;
pub use kind::TypeDef;
pub use value::Value;
