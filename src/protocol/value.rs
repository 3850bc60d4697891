//! RESP value model and outbound encoder.
//!
//! [`RespValue`] is a closed enum with one case per wire type. Values are
//! immutable once constructed: the decoder builds them bottom-up, callers
//! build outbound commands with [`RespValue::command`], and ownership moves
//! through the connection without aliasing.
//!
//! Equality and hashing are structural. `Double` compares by bit pattern and
//! map/set contents compare regardless of insertion order, so a value is
//! usable as a `HashMap` key or `HashSet` member (RESP3 maps are keyed by
//! arbitrary values).

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{RedisError, Result};

/// A single RESP2/RESP3 protocol value.
#[derive(Debug, Clone)]
pub enum RespValue {
    /// RESP 2+: `+<string>\r\n`
    SimpleString(String),
    /// RESP 2+: `-<string>\r\n`
    ErrorString(String),
    /// RESP 2+: `:<number>\r\n`
    Integer(i64),
    /// RESP 2+: `$<length>\r\n<bytes>\r\n`
    BlobString(Vec<u8>),
    /// RESP 2: `$-1\r\n`
    NullBulkString,
    /// RESP 2: `*-1\r\n`
    NullArray,
    /// RESP 3: `_\r\n`
    Null,
    /// RESP 3: `,<floating-point-number>\r\n`
    Double(f64),
    /// RESP 3: `#t\r\n` / `#f\r\n`
    Boolean(bool),
    /// RESP 3: `!<length>\r\n<bytes>\r\n`
    BlobError(Vec<u8>),
    /// RESP 3: `=<length>\r\n<bytes>\r\n`
    VerbatimString(Vec<u8>),
    /// RESP 3: `(<digits>\r\n`
    BigNumber(Vec<u8>),
    /// RESP 2+: `*<count>\r\n<elements>`
    Array(Vec<RespValue>),
    /// RESP 3: `%<count>\r\n<2*count elements>`
    Map(HashMap<RespValue, RespValue>),
    /// RESP 3: `~<count>\r\n<elements>`
    Set(HashSet<RespValue>),
    /// RESP 3: `|<count>\r\n<2*count elements>`, side-channel metadata
    Attribute(HashMap<RespValue, RespValue>),
    /// RESP 3: `><count>\r\n<kind, channel, payload>`
    Push(PushMessage),
}

/// A server-pushed pub/sub message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PushMessage {
    /// What the server is telling us.
    pub kind: PushKind,
    /// Channel the message belongs to.
    pub channel: String,
    /// Message payload (subscription count for confirmations).
    ///
    /// Boxed to break the `RespValue` -> `PushMessage` -> `RespValue` type
    /// cycle; `Deref` makes it read like a plain `RespValue`.
    pub payload: Box<RespValue>,
}

/// Recognized push message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushKind {
    /// A published message on a subscribed channel.
    Message,
    /// Confirmation that a SUBSCRIBE took effect.
    Subscribe,
    /// Confirmation that an UNSUBSCRIBE took effect.
    Unsubscribe,
}

impl PushKind {
    /// Parse a kind from its wire name (case-insensitive).
    pub fn from_name(name: &str) -> Option<PushKind> {
        match name.to_ascii_lowercase().as_str() {
            "message" => Some(PushKind::Message),
            "subscribe" => Some(PushKind::Subscribe),
            "unsubscribe" => Some(PushKind::Unsubscribe),
            _ => None,
        }
    }

    /// The wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            PushKind::Message => "message",
            PushKind::Subscribe => "subscribe",
            PushKind::Unsubscribe => "unsubscribe",
        }
    }
}

impl RespValue {
    /// Build a blob string from UTF-8 text.
    pub fn blob_string(text: impl Into<String>) -> RespValue {
        RespValue::BlobString(text.into().into_bytes())
    }

    /// Build a command array: one blob string per argument.
    ///
    /// This is the standard request encoding — every outbound command is an
    /// array of blob strings.
    ///
    /// # Example
    ///
    /// ```
    /// use respwire::RespValue;
    ///
    /// let cmd = RespValue::command(["SET", "foo", "bar"]);
    /// assert_eq!(cmd.encode().unwrap(), b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
    /// ```
    pub fn command<I, S>(args: I) -> RespValue
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RespValue::Array(args.into_iter().map(RespValue::blob_string).collect())
    }

    /// Get the integer payload.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if this is not an `Integer`.
    pub fn integer_value(&self) -> Result<i64> {
        match self {
            RespValue::Integer(value) => Ok(*value),
            _ => Err(RedisError::TypeMismatch),
        }
    }

    /// Get the text payload of any string-like variant.
    ///
    /// Simple and error strings return their text directly; blob string,
    /// blob error, and verbatim string payloads are decoded as UTF-8.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` for non-string variants, `StringDecoding` when blob
    /// bytes are not valid UTF-8.
    pub fn string_value(&self) -> Result<String> {
        match self {
            RespValue::SimpleString(text) | RespValue::ErrorString(text) => Ok(text.clone()),
            RespValue::BlobString(bytes)
            | RespValue::BlobError(bytes)
            | RespValue::VerbatimString(bytes) => String::from_utf8(bytes.clone())
                .map_err(|_| RedisError::StringDecoding),
            _ => Err(RedisError::TypeMismatch),
        }
    }

    /// Get the elements of an `Array`.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if this is not an `Array`.
    pub fn array_value(&self) -> Result<&[RespValue]> {
        match self {
            RespValue::Array(values) => Ok(values),
            _ => Err(RedisError::TypeMismatch),
        }
    }

    /// Get the push message payload.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if this is not a `Push`.
    pub fn push_value(&self) -> Result<&PushMessage> {
        match self {
            RespValue::Push(push) => Ok(push),
            _ => Err(RedisError::TypeMismatch),
        }
    }
}

impl RespValue {
    /// Encode this value to its wire bytes.
    ///
    /// Total over every variant a client sends. Double, map, set, attribute,
    /// and push have no documented client-originated wire form and return
    /// [`RedisError::UnsupportedEncoding`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Encode this value into an existing buffer.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            RespValue::SimpleString(text) => {
                out.push(b'+');
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::ErrorString(text) => {
                out.push(b'-');
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(value) => {
                out.push(b':');
                out.extend_from_slice(value.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::BlobString(bytes) => {
                encode_blob(out, b'$', bytes);
            }
            RespValue::NullBulkString => {
                out.extend_from_slice(b"$-1\r\n");
            }
            RespValue::NullArray => {
                out.extend_from_slice(b"*-1\r\n");
            }
            RespValue::Null => {
                out.extend_from_slice(b"_\r\n");
            }
            RespValue::Boolean(value) => {
                out.extend_from_slice(if *value { b"#t\r\n" } else { b"#f\r\n" });
            }
            RespValue::BlobError(bytes) => {
                encode_blob(out, b'!', bytes);
            }
            RespValue::VerbatimString(bytes) => {
                encode_blob(out, b'=', bytes);
            }
            RespValue::BigNumber(digits) => {
                out.push(b'(');
                out.extend_from_slice(digits);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Array(values) => {
                out.push(b'*');
                out.extend_from_slice(values.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for value in values {
                    value.encode_into(out)?;
                }
            }
            RespValue::Double(_) => return Err(RedisError::UnsupportedEncoding("double")),
            RespValue::Map(_) => return Err(RedisError::UnsupportedEncoding("map")),
            RespValue::Set(_) => return Err(RedisError::UnsupportedEncoding("set")),
            RespValue::Attribute(_) => return Err(RedisError::UnsupportedEncoding("attribute")),
            RespValue::Push(_) => return Err(RedisError::UnsupportedEncoding("push")),
        }
        Ok(())
    }
}

fn encode_blob(out: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
    out.push(tag);
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(bytes);
    out.extend_from_slice(b"\r\n");
}

impl PartialEq for RespValue {
    fn eq(&self, other: &Self) -> bool {
        use RespValue::*;
        match (self, other) {
            (SimpleString(a), SimpleString(b)) | (ErrorString(a), ErrorString(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (BlobString(a), BlobString(b))
            | (BlobError(a), BlobError(b))
            | (VerbatimString(a), VerbatimString(b))
            | (BigNumber(a), BigNumber(b)) => a == b,
            (NullBulkString, NullBulkString) | (NullArray, NullArray) | (Null, Null) => true,
            // Bit-pattern comparison keeps Eq lawful for NaN payloads.
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (Boolean(a), Boolean(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) | (Attribute(a), Attribute(b)) => a == b,
            (Set(a), Set(b)) => a == b,
            (Push(a), Push(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for RespValue {}

impl Hash for RespValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use RespValue::*;
        std::mem::discriminant(self).hash(state);
        match self {
            SimpleString(text) | ErrorString(text) => text.hash(state),
            Integer(value) => value.hash(state),
            BlobString(bytes) | BlobError(bytes) | VerbatimString(bytes) | BigNumber(bytes) => {
                bytes.hash(state)
            }
            NullBulkString | NullArray | Null => {}
            Double(value) => value.to_bits().hash(state),
            Boolean(value) => value.hash(state),
            Array(values) => values.hash(state),
            // Entry hashes combine with XOR so iteration order cannot leak
            // into the result; HashMap equality is order-insensitive and the
            // hash must agree with it.
            Map(entries) | Attribute(entries) => {
                entries.len().hash(state);
                let mut combined: u64 = 0;
                for entry in entries {
                    combined ^= single_hash(&entry);
                }
                state.write_u64(combined);
            }
            Set(members) => {
                members.len().hash(state);
                let mut combined: u64 = 0;
                for member in members {
                    combined ^= single_hash(member);
                }
                state.write_u64(combined);
            }
            Push(push) => push.hash(state),
        }
    }
}

fn single_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(text) | RespValue::ErrorString(text) => f.write_str(text),
            RespValue::Integer(value) => write!(f, "{}", value),
            RespValue::BlobString(bytes)
            | RespValue::BlobError(bytes)
            | RespValue::VerbatimString(bytes) => {
                write!(f, "{}", String::from_utf8_lossy(bytes))
            }
            RespValue::NullBulkString => f.write_str("<nil-string>"),
            RespValue::NullArray => f.write_str("<nil-array>"),
            RespValue::Null => f.write_str("<null>"),
            RespValue::Double(value) => write!(f, "{}", value),
            RespValue::Boolean(value) => write!(f, "{}", value),
            RespValue::BigNumber(digits) => {
                write!(f, "{}", String::from_utf8_lossy(digits))
            }
            RespValue::Array(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
            RespValue::Map(entries) => write_entries(f, "map", entries),
            RespValue::Attribute(entries) => write_entries(f, "attribute", entries),
            RespValue::Set(members) => {
                f.write_str("set{")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", member)?;
                }
                f.write_str("}")
            }
            RespValue::Push(push) => {
                write!(f, "push({} {}: {})", push.kind.as_str(), push.channel, push.payload)
            }
        }
    }
}

fn write_entries(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    entries: &HashMap<RespValue, RespValue>,
) -> fmt::Result {
    write!(f, "{}{{", name)?;
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}: {}", key, value)?;
    }
    f.write_str("}")
}
