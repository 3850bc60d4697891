//! # respwire
//!
//! Async RESP2/RESP3 client connection for Redis-compatible servers.
//!
//! The crate has three layers:
//!
//! - **Value model** ([`RespValue`]): a closed enum over every wire type,
//!   with typed accessors and the outbound encoder.
//! - **Incremental parser** ([`ValueParser`], [`FrameBuffer`]): byte-at-a-time
//!   state machines that turn an arbitrarily-fragmented byte stream into
//!   values without ever blocking for a complete message.
//! - **Connection** ([`RedisConnection`]): owns the TCP transport, runs the
//!   connect/ready/failed lifecycle, serializes request/response calls, and
//!   exposes pub/sub as a pull-based message stream ([`Subscriber`]).
//!
//! ## Example
//!
//! ```ignore
//! use respwire::{ConnectionConfig, RedisConnection};
//!
//! #[tokio::main]
//! async fn main() -> respwire::Result<()> {
//!     let mut connection = RedisConnection::new(ConnectionConfig::default());
//!     connection.connect().await?;
//!     connection.hello("default", "secret", None).await?;
//!
//!     connection.send_command(["SET", "foo", "bar"]).await?;
//!     let reply = connection.send_command(["GET", "foo"]).await?;
//!     println!("{}", reply.string_value()?);
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod protocol;

pub use connection::{ConnectionConfig, ConnectionState, RedisConnection, Subscriber};
pub use error::{RedisError, Result};
pub use protocol::{FrameBuffer, PushKind, PushMessage, RespValue, ValueParser};
