//! Connection state machine and request/response execution.
//!
//! [`RedisConnection`] owns the TCP transport, the inbound [`FrameBuffer`],
//! and the connection lifecycle:
//!
//! ```text
//! Unstarted --connect--> Connecting --ok--> Ready
//!                            |
//!                            +--err--> Failed(e)
//! (any state) --disconnect--> Cancelled
//! ```
//!
//! RESP is a strictly ordered protocol: interleaving two requests' bytes on
//! the wire would corrupt both. Every operation therefore takes `&mut self`,
//! so the borrow checker enforces the one-outstanding-request rule at
//! compile time; callers that share a connection across tasks wrap it in
//! `tokio::sync::Mutex` and get arrival-order queueing.
//!
//! A connection starts in normal (request/response) mode. `subscribe` flips
//! it into subscriber mode for the rest of its lifetime; from then on the
//! inbound stream carries server-pushed messages consumed through
//! [`Subscriber`].

use std::collections::{HashSet, VecDeque};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::error::{RedisError, Result};
use crate::protocol::{FrameBuffer, PushKind, PushMessage, RespValue};

/// Size of the transport read buffer.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Configuration for a single connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Optional tag carried into log events for diagnostics.
    pub label: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            host: "localhost".to_string(),
            port: 6379,
            label: None,
        }
    }
}

/// Lifecycle states of a connection.
///
/// Mutated only by the connection's own transitions; observers read it via
/// [`RedisConnection::state`] or the [`RedisConnection::state_changes`] feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, `connect` not yet called.
    Unstarted,
    /// TCP connect in flight.
    Connecting,
    /// Connected and usable.
    Ready,
    /// Transport or protocol failure; the carried text describes it.
    Failed(String),
    /// Torn down by request.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Subscriber,
}

/// An asynchronous client connection to a Redis-compatible server.
pub struct RedisConnection {
    config: ConnectionConfig,
    stream: Option<TcpStream>,
    frames: FrameBuffer,
    /// Decoded values not yet delivered to a caller, in arrival order.
    pending: VecDeque<RespValue>,
    mode: Mode,
    state_tx: watch::Sender<ConnectionState>,
}

impl RedisConnection {
    /// Create an unstarted connection.
    pub fn new(config: ConnectionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Unstarted);
        RedisConnection {
            config,
            stream: None,
            frames: FrameBuffer::new(),
            pending: VecDeque::new(),
            mode: Mode::Normal,
            state_tx,
        }
    }

    /// The configured diagnostic label, if any.
    pub fn label(&self) -> Option<&str> {
        self.config.label.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to state-change notifications.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        tracing::debug!(label = ?self.config.label, ?state, "state change");
        self.state_tx.send_replace(state);
    }

    /// Establish the TCP connection.
    ///
    /// Suspends until the transport is ready. Valid only on an `Unstarted`
    /// connection; on failure the state moves to `Failed` and the error is
    /// returned.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state() != ConnectionState::Unstarted {
            return Err(RedisError::UnexpectedState);
        }
        self.set_state(ConnectionState::Connecting);
        match TcpStream::connect((self.config.host.as_str(), self.config.port)).await {
            Ok(stream) => {
                // Request bytes are small and latency-sensitive.
                if let Err(error) = stream.set_nodelay(true) {
                    tracing::debug!("set_nodelay failed: {}", error);
                }
                self.stream = Some(stream);
                self.set_state(ConnectionState::Ready);
                Ok(())
            }
            Err(error) => {
                tracing::error!(label = ?self.config.label, "connect failed: {}", error);
                self.set_state(ConnectionState::Failed(error.to_string()));
                Err(error.into())
            }
        }
    }

    /// Tear the connection down.
    ///
    /// Returns once the transport acknowledges shutdown. Valid from any
    /// state.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        self.set_state(ConnectionState::Cancelled);
        Ok(())
    }

    /// Send one value and await exactly one reply.
    ///
    /// Valid only in normal mode. Transport and parse errors mark the
    /// connection failed; no further requests succeed without reconnecting.
    pub async fn send(&mut self, value: &RespValue) -> Result<RespValue> {
        self.ensure_normal_mode()?;
        let encoded = value.encode()?;
        self.write_all(&encoded).await?;
        self.receive_value().await
    }

    /// Send one value without reading a reply.
    ///
    /// The fire-and-forget half for exchanges where the reply is read
    /// through a different path.
    pub async fn send_no_receive(&mut self, value: &RespValue) -> Result<()> {
        self.ensure_normal_mode()?;
        let encoded = value.encode()?;
        self.write_all(&encoded).await
    }

    /// Read one value from the transport.
    ///
    /// Valid only in normal mode; pairs with [`send_no_receive`].
    ///
    /// [`send_no_receive`]: RedisConnection::send_no_receive
    pub async fn receive(&mut self) -> Result<RespValue> {
        self.ensure_normal_mode()?;
        self.receive_value().await
    }

    /// Send a command built from string arguments and await the reply.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let reply = connection.send_command(["SET", "foo", "bar"]).await?;
    /// ```
    pub async fn send_command<I, S>(&mut self, args: I) -> Result<RespValue>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(&RespValue::command(args)).await
    }

    /// Send a command built from string arguments without reading a reply.
    pub async fn send_command_no_receive<I, S>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send_no_receive(&RespValue::command(args)).await
    }

    /// Encode several values into a single write, reading no replies.
    ///
    /// Useful for bulk fire-and-forget traffic such as batched PUBLISH
    /// commands; the caller is responsible for draining any replies the
    /// server produces.
    pub async fn send_all(&mut self, values: &[RespValue]) -> Result<()> {
        self.ensure_normal_mode()?;
        let mut encoded = Vec::new();
        for value in values {
            value.encode_into(&mut encoded)?;
        }
        self.write_all(&encoded).await
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let result = match self.stream.as_mut() {
            Some(stream) => stream.write_all(bytes).await,
            None => return Err(RedisError::ConnectionClosed),
        };
        if let Err(error) = result {
            self.set_state(ConnectionState::Failed(error.to_string()));
            return Err(error.into());
        }
        Ok(())
    }

    /// Deliver the next decoded value, reading from the transport as needed.
    ///
    /// The only await is the `read()` call, which is cancel-safe; all buffer
    /// and parser mutation after it is synchronous, so a cancelled caller
    /// leaves the byte-stream position consistent.
    async fn receive_value(&mut self) -> Result<RespValue> {
        loop {
            if let Some(value) = self.pending.pop_front() {
                return Ok(value);
            }

            let mut chunk = [0u8; READ_BUFFER_SIZE];
            let read = match self.stream.as_mut() {
                Some(stream) => stream.read(&mut chunk).await,
                None => return Err(RedisError::ConnectionClosed),
            };
            let count = match read {
                Ok(0) => {
                    self.set_state(ConnectionState::Failed(
                        "connection closed by peer".to_string(),
                    ));
                    return Err(RedisError::ConnectionClosed);
                }
                Ok(count) => count,
                Err(error) => {
                    self.set_state(ConnectionState::Failed(error.to_string()));
                    return Err(error.into());
                }
            };

            match self.frames.push(&chunk[..count]) {
                Ok(values) => self.pending.extend(values),
                Err(error) => {
                    // The stream is desynchronized; nothing after this point
                    // can be trusted.
                    tracing::error!(label = ?self.config.label, "inbound parse failed: {}", error);
                    self.set_state(ConnectionState::Failed(error.to_string()));
                    return Err(error);
                }
            }
        }
    }

    fn ensure_normal_mode(&self) -> Result<()> {
        if self.mode != Mode::Normal {
            return Err(RedisError::UnexpectedState);
        }
        Ok(())
    }
}

impl RedisConnection {
    /// Perform the RESP3 handshake: `HELLO 3 AUTH <user> <password>
    /// [SETNAME <name>]`.
    ///
    /// The conventional username is `"default"`. Succeeds only if the reply
    /// is a map whose `proto` key holds the integer `3`; anything else is an
    /// authentication failure.
    pub async fn hello(
        &mut self,
        username: &str,
        password: &str,
        client_name: Option<&str>,
    ) -> Result<()> {
        let mut request = vec![
            "HELLO".to_string(),
            "3".to_string(),
            "AUTH".to_string(),
            username.to_string(),
            password.to_string(),
        ];
        if let Some(name) = client_name {
            request.push("SETNAME".to_string());
            request.push(name.to_string());
        }

        let reply = self.send(&RespValue::command(request)).await?;
        let entries = match reply {
            RespValue::Map(entries) => entries,
            _ => return Err(RedisError::AuthenticationFailure),
        };
        let proto = entries
            .get(&RespValue::blob_string("proto"))
            .and_then(|value| value.integer_value().ok());
        if proto != Some(3) {
            return Err(RedisError::AuthenticationFailure);
        }
        tracing::debug!(label = ?self.config.label, "handshake complete");
        Ok(())
    }

    /// Authenticate with `AUTH <password>` (the pre-RESP3 path).
    ///
    /// The reply must be the string `"OK"`.
    pub async fn authenticate(&mut self, password: &str) -> Result<()> {
        let reply = self.send_command(["AUTH", password]).await?;
        match reply.string_value() {
            Ok(text) if text == "OK" => Ok(()),
            _ => Err(RedisError::AuthenticationFailure),
        }
    }
}

impl RedisConnection {
    /// Enter subscriber mode and subscribe to the given channels.
    ///
    /// Writes a single `SUBSCRIBE` for all channels, then reads one
    /// confirmation per channel. The confirmed channel set must equal the
    /// requested set exactly, or the call fails with `PartialSubscribe` and
    /// the connection is unusable for further subscriptions (no partial
    /// undo is attempted).
    ///
    /// Subscriber mode is irreversible for the lifetime of the connection:
    /// after this call, normal-mode operations fail with `UnexpectedState`.
    /// At least one channel is required.
    pub async fn subscribe(&mut self, channels: &[&str]) -> Result<Subscriber<'_>> {
        self.ensure_normal_mode()?;
        if channels.is_empty() {
            return Err(RedisError::UnexpectedState);
        }

        let mut args = Vec::with_capacity(channels.len() + 1);
        args.push("SUBSCRIBE".to_string());
        args.extend(channels.iter().map(|channel| channel.to_string()));
        let encoded = RespValue::command(args).encode()?;
        self.write_all(&encoded).await?;
        self.mode = Mode::Subscriber;

        let mut confirmed = HashSet::new();
        for _ in 0..channels.len() {
            let value = self.receive_value().await?;
            let push = match value {
                RespValue::Push(push) if push.kind == PushKind::Subscribe => push,
                _ => return Err(RedisError::MessageReceiveFailure),
            };
            confirmed.insert(push.channel);
        }
        let requested: HashSet<String> =
            channels.iter().map(|channel| channel.to_string()).collect();
        if confirmed != requested {
            return Err(RedisError::PartialSubscribe);
        }

        tracing::debug!(label = ?self.config.label, ?channels, "subscribed");
        Ok(Subscriber { connection: self })
    }

    /// Publish a payload to a channel.
    ///
    /// Valid only in normal mode. Returns the number of subscribers that
    /// received the message.
    pub async fn publish(&mut self, channel: &str, payload: &str) -> Result<i64> {
        let reply = self.send_command(["PUBLISH", channel, payload]).await?;
        reply.integer_value()
    }
}

/// A lazy, single-pass stream of server-pushed messages.
///
/// Each [`next_message`](Subscriber::next_message) call reads one value from
/// the transport. The stream has no natural end: it runs until the consumer
/// stops pulling (drop the subscriber or cancel the pull) or an error
/// occurs. Consumers detect "end of interesting data" by inspecting message
/// contents, not by the stream terminating.
pub struct Subscriber<'a> {
    connection: &'a mut RedisConnection,
}

impl Subscriber<'_> {
    /// Pull the next pushed message.
    ///
    /// # Errors
    ///
    /// `MessageReceiveFailure` if a non-push value arrives (a protocol
    /// violation in subscriber mode); transport and parse errors propagate
    /// and exhaust the stream.
    pub async fn next_message(&mut self) -> Result<PushMessage> {
        let value = self.connection.receive_value().await?;
        match value {
            RespValue::Push(push) => Ok(push),
            other => {
                tracing::error!(
                    label = ?self.connection.config.label,
                    "subscriber stream received a non-push value: {}",
                    other
                );
                Err(RedisError::MessageReceiveFailure)
            }
        }
    }
}
