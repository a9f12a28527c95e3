//! # Bindrun
//!
//! Runtime for exposing host objects to the script of an embedded UI surface.
//!
//! ## Architecture
//!
//! - [`bind`]: the [`Bindable`] contract a host object implements.
//! - [`registry`]: validates the bound set into an immutable [`Catalog`].
//! - [`dispatch`]: resolves, coerces and invokes one call per request.
//! - [`events`]: host → UI notifications over the same transport.
//! - [`bridge`]: the lifecycle tying the above to a [`Transport`].
//! - [`client`]: the UI side of the protocol, for tests and native front-ends.
//!
//! ```ignore
//! let bridge = Bridge::builder()
//!     .bind(Functions::new("math").func(
//!         MethodSpec::new("add").param("a", Kind::Integer).param("b", Kind::Integer).returns(Kind::Integer),
//!         |args| async move { Ok(Value::Int(args.decode::<i64>(0)? + args.decode::<i64>(1)?)) },
//!     ))
//!     .build()?;
//!
//! let (host, ui) = ChannelTransport::pair();
//! bridge.attach(host)?;
//! let client = Client::new(ui);
//! assert_eq!(client.call("math", "add", vec![2.into(), 3.into()]).await?, Value::Int(5));
//! ```

pub mod bind;
pub mod bridge;
pub mod channel;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod registry;
pub mod transport;

pub use bind::Args;
pub use bind::Bindable;
pub use bind::Functions;
pub use bind::InvokeError;
pub use bind::MethodSpec;
pub use bridge::Bridge;
pub use bridge::BridgeBuilder;
pub use bridge::State;
pub use bridge::Surface;
pub use channel::ChannelTransport;
pub use client::Client;
pub use client::Subscription;
pub use config::BridgeConfig;
pub use dispatch::Dispatcher;
pub use events::EventChannel;
pub use registry::Catalog;
pub use registry::MethodSignature;
pub use registry::ObjectSchema;
pub use registry::Param;
pub use registry::Registry;
pub use transport::Transport;

#[cfg(test)]
mod tests;
