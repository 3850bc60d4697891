//! Incremental RESP decoders.
//!
//! Three byte-at-a-time state machines cover every wire shape:
//!
//! - [`LineDecoder`]: header byte, then a run of bytes terminated by CRLF
//!   (`+ - : _ # ( ,`)
//! - [`BlobDecoder`]: header byte, ASCII length line, exactly that many
//!   payload bytes, trailing CRLF (`$ ! =`)
//! - [`CollectionDecoder`]: header byte, ASCII count line, then that many
//!   recursively-parsed sub-values (`* % ~ | >`)
//!
//! [`ValueParser`] reads the leading tag byte, selects the decoder, and
//! delegates every following byte to it until a value completes. Feeding is
//! incremental: a value split across any number of reads parses identically
//! to the same bytes fed at once, and `bytes_parsed()` reports exactly how
//! far into the stream the parser has consumed so the frame buffer never
//! re-feeds or drops bytes.

use std::collections::HashMap;

use super::value::{PushKind, PushMessage, RespValue};
use crate::error::{RedisError, Result};

const CRLF: &[u8] = b"\r\n";

fn parse_error(message: impl Into<String>) -> RedisError {
    RedisError::Parse(message.into())
}

fn ascii_i64(line: &[u8]) -> Result<i64> {
    let text =
        std::str::from_utf8(line).map_err(|_| parse_error("numeric line is not ASCII"))?;
    text.parse::<i64>()
        .map_err(|_| parse_error(format!("invalid integer: {text:?}")))
}

fn ascii_f64(line: &[u8]) -> Result<f64> {
    let text =
        std::str::from_utf8(line).map_err(|_| parse_error("numeric line is not ASCII"))?;
    text.parse::<f64>()
        .map_err(|_| parse_error(format!("invalid double: {text:?}")))
}

fn utf8_string(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| RedisError::StringDecoding)
}

/// Decoder for fixed-terminator values: a header byte, then an arbitrary run
/// of bytes ending in CRLF.
#[derive(Debug)]
struct LineDecoder {
    tag: u8,
    state: LineState,
    bytes: Vec<u8>,
}

#[derive(Debug)]
enum LineState {
    WaitingHeader,
    Accumulating,
}

impl LineDecoder {
    fn new(tag: u8) -> Self {
        LineDecoder {
            tag,
            state: LineState::WaitingHeader,
            bytes: Vec::new(),
        }
    }

    fn feed(&mut self, byte: u8) -> Result<Option<RespValue>> {
        match self.state {
            LineState::WaitingHeader => {
                if byte != self.tag {
                    return Err(parse_error(format!(
                        "expected {:?} header, got {:?}",
                        self.tag as char, byte as char
                    )));
                }
                self.state = LineState::Accumulating;
                Ok(None)
            }
            LineState::Accumulating => {
                self.bytes.push(byte);
                if self.bytes.ends_with(CRLF) {
                    let mut line = std::mem::take(&mut self.bytes);
                    line.truncate(line.len() - 2);
                    self.emit(&line).map(Some)
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn emit(&self, line: &[u8]) -> Result<RespValue> {
        match self.tag {
            b'+' => Ok(RespValue::SimpleString(utf8_string(line)?)),
            b'-' => Ok(RespValue::ErrorString(utf8_string(line)?)),
            b':' => Ok(RespValue::Integer(ascii_i64(line)?)),
            b'_' => {
                if line.is_empty() {
                    Ok(RespValue::Null)
                } else {
                    Err(parse_error("null value carries no payload"))
                }
            }
            b'#' => match line {
                b"t" => Ok(RespValue::Boolean(true)),
                b"f" => Ok(RespValue::Boolean(false)),
                _ => Err(parse_error("boolean payload must be 't' or 'f'")),
            },
            b'(' => Ok(RespValue::BigNumber(line.to_vec())),
            b',' => Ok(RespValue::Double(ascii_f64(line)?)),
            other => Err(RedisError::UnknownHeader(other as char)),
        }
    }
}

/// Decoder for length-framed values: header, ASCII length line, exactly
/// `length` payload bytes, trailing CRLF.
#[derive(Debug)]
struct BlobDecoder {
    tag: u8,
    state: BlobState,
    bytes: Vec<u8>,
}

#[derive(Debug)]
enum BlobState {
    WaitingHeader,
    ReadingLength,
    ReadingPayload { length: usize },
}

impl BlobDecoder {
    fn new(tag: u8) -> Self {
        BlobDecoder {
            tag,
            state: BlobState::WaitingHeader,
            bytes: Vec::new(),
        }
    }

    fn feed(&mut self, byte: u8) -> Result<Option<RespValue>> {
        match self.state {
            BlobState::WaitingHeader => {
                if byte != self.tag {
                    return Err(parse_error(format!(
                        "expected {:?} header, got {:?}",
                        self.tag as char, byte as char
                    )));
                }
                self.state = BlobState::ReadingLength;
                Ok(None)
            }
            BlobState::ReadingLength => {
                self.bytes.push(byte);
                if !self.bytes.ends_with(CRLF) {
                    return Ok(None);
                }
                let declared = ascii_i64(&self.bytes[..self.bytes.len() - 2])?;
                self.bytes.clear();
                if declared < 0 {
                    // -1 is the null sentinel, defined for blob strings only.
                    if declared == -1 && self.tag == b'$' {
                        return Ok(Some(RespValue::NullBulkString));
                    }
                    return Err(parse_error(format!(
                        "invalid {:?} length: {declared}",
                        self.tag as char
                    )));
                }
                self.state = BlobState::ReadingPayload {
                    length: declared as usize,
                };
                Ok(None)
            }
            BlobState::ReadingPayload { length } => {
                self.bytes.push(byte);
                if self.bytes.len() < length + 2 {
                    return Ok(None);
                }
                if !self.bytes.ends_with(CRLF) {
                    return Err(parse_error("blob payload missing CRLF terminator"));
                }
                let mut payload = std::mem::take(&mut self.bytes);
                payload.truncate(length);
                match self.tag {
                    b'$' => Ok(Some(RespValue::BlobString(payload))),
                    b'!' => Ok(Some(RespValue::BlobError(payload))),
                    b'=' => Ok(Some(RespValue::VerbatimString(payload))),
                    other => Err(RedisError::UnknownHeader(other as char)),
                }
            }
        }
    }
}

/// Decoder for counted collections: header, ASCII count line, then `count`
/// sub-values each parsed by a fresh [`ValueParser`].
#[derive(Debug)]
struct CollectionDecoder {
    tag: u8,
    state: CollectionState,
    bytes: Vec<u8>,
    expected: usize,
    values: Vec<RespValue>,
    element: ValueParser,
}

#[derive(Debug)]
enum CollectionState {
    WaitingHeader,
    ReadingCount,
    ReadingElements,
}

impl CollectionDecoder {
    fn new(tag: u8) -> Self {
        CollectionDecoder {
            tag,
            state: CollectionState::WaitingHeader,
            bytes: Vec::new(),
            expected: 0,
            values: Vec::new(),
            element: ValueParser::new(),
        }
    }

    fn feed(&mut self, byte: u8) -> Result<Option<RespValue>> {
        match self.state {
            CollectionState::WaitingHeader => {
                if byte != self.tag {
                    return Err(parse_error(format!(
                        "expected {:?} header, got {:?}",
                        self.tag as char, byte as char
                    )));
                }
                self.state = CollectionState::ReadingCount;
                Ok(None)
            }
            CollectionState::ReadingCount => {
                self.bytes.push(byte);
                if !self.bytes.ends_with(CRLF) {
                    return Ok(None);
                }
                let declared = ascii_i64(&self.bytes[..self.bytes.len() - 2])?;
                self.bytes.clear();
                if declared < 0 {
                    // -1 is the null sentinel, defined for arrays only.
                    if declared == -1 && self.tag == b'*' {
                        return Ok(Some(RespValue::NullArray));
                    }
                    return Err(parse_error(format!(
                        "invalid {:?} count: {declared}",
                        self.tag as char
                    )));
                }
                // Key/value containers declare pair counts on the wire.
                let multiplier: usize = match self.tag {
                    b'%' | b'|' => 2,
                    _ => 1,
                };
                self.expected = (declared as usize).checked_mul(multiplier).ok_or_else(
                    || parse_error(format!("collection count {declared} overflows")),
                )?;
                if self.expected == 0 {
                    return self.reduce().map(Some);
                }
                self.state = CollectionState::ReadingElements;
                Ok(None)
            }
            CollectionState::ReadingElements => {
                if let Some(value) = self.element.parse(byte)? {
                    self.values.push(value);
                    self.element = ValueParser::new();
                    if self.values.len() == self.expected {
                        return self.reduce().map(Some);
                    }
                }
                Ok(None)
            }
        }
    }

    fn reduce(&mut self) -> Result<RespValue> {
        let values = std::mem::take(&mut self.values);
        match self.tag {
            b'*' => Ok(RespValue::Array(values)),
            b'%' => Ok(RespValue::Map(pair_entries(values)?)),
            b'|' => Ok(RespValue::Attribute(pair_entries(values)?)),
            b'~' => Ok(RespValue::Set(values.into_iter().collect())),
            b'>' => reduce_push(values),
            other => Err(RedisError::UnknownHeader(other as char)),
        }
    }
}

/// Pair adjacent elements into key/value entries.
///
/// Fails on an odd element count or a duplicate key — dropping data silently
/// would hide a protocol violation.
fn pair_entries(values: Vec<RespValue>) -> Result<HashMap<RespValue, RespValue>> {
    if values.len() % 2 != 0 {
        return Err(parse_error(format!(
            "key/value container has odd element count {}",
            values.len()
        )));
    }
    let mut entries = HashMap::with_capacity(values.len() / 2);
    let mut elements = values.into_iter();
    while let (Some(key), Some(value)) = (elements.next(), elements.next()) {
        if entries.insert(key, value).is_some() {
            return Err(parse_error("duplicate key in key/value container"));
        }
    }
    Ok(entries)
}

/// Interpret a push frame: element 0 is the kind, 1 the channel, 2 the
/// payload.
fn reduce_push(values: Vec<RespValue>) -> Result<RespValue> {
    if values.len() != 3 {
        return Err(parse_error(format!(
            "push message needs 3 elements, got {}",
            values.len()
        )));
    }
    let mut elements = values.into_iter();
    let (kind, channel, payload) = match (elements.next(), elements.next(), elements.next()) {
        (Some(kind), Some(channel), Some(payload)) => (kind, channel, payload),
        _ => return Err(parse_error("push message needs 3 elements")),
    };
    let kind_name = kind
        .string_value()
        .map_err(|_| parse_error("push kind must be a string"))?;
    let kind = PushKind::from_name(&kind_name)
        .ok_or_else(|| parse_error(format!("unrecognized push kind {kind_name:?}")))?;
    let channel = channel
        .string_value()
        .map_err(|_| parse_error("push channel must be a string"))?;
    Ok(RespValue::Push(PushMessage {
        kind,
        channel,
        payload: Box::new(payload),
    }))
}

/// One active decoder, selected by the leading tag byte.
#[derive(Debug)]
enum Decoder {
    Line(LineDecoder),
    Blob(BlobDecoder),
    Collection(Box<CollectionDecoder>),
}

impl Decoder {
    fn for_tag(tag: u8) -> Result<Decoder> {
        match tag {
            b'+' | b'-' | b':' | b'_' | b'#' | b'(' | b',' => {
                Ok(Decoder::Line(LineDecoder::new(tag)))
            }
            b'$' | b'!' | b'=' => Ok(Decoder::Blob(BlobDecoder::new(tag))),
            b'*' | b'%' | b'~' | b'|' | b'>' => {
                Ok(Decoder::Collection(Box::new(CollectionDecoder::new(tag))))
            }
            other => Err(RedisError::UnknownHeader(other as char)),
        }
    }

    fn feed(&mut self, byte: u8) -> Result<Option<RespValue>> {
        match self {
            Decoder::Line(decoder) => decoder.feed(byte),
            Decoder::Blob(decoder) => decoder.feed(byte),
            Decoder::Collection(decoder) => decoder.feed(byte),
        }
    }
}

/// Dispatching parser for one RESP value.
///
/// Feed bytes with [`parse`](ValueParser::parse) or
/// [`parse_bytes`](ValueParser::parse_bytes); once a value is returned the
/// parser is reset and ready for the next value's header byte.
#[derive(Debug, Default)]
pub struct ValueParser {
    decoder: Option<Decoder>,
    bytes_parsed: usize,
}

impl ValueParser {
    /// Create a parser positioned at a fresh value boundary.
    pub fn new() -> Self {
        ValueParser {
            decoder: None,
            bytes_parsed: 0,
        }
    }

    /// Total bytes this parser instance has consumed.
    pub fn bytes_parsed(&self) -> usize {
        self.bytes_parsed
    }

    /// Feed a single byte.
    ///
    /// Returns `Ok(Some(value))` when the byte completes a value,
    /// `Ok(None)` when more input is needed. Errors are not recoverable:
    /// the stream position can no longer be trusted.
    pub fn parse(&mut self, byte: u8) -> Result<Option<RespValue>> {
        let mut decoder = match self.decoder.take() {
            Some(decoder) => decoder,
            None => Decoder::for_tag(byte)?,
        };
        self.bytes_parsed += 1;
        let completed = decoder.feed(byte)?;
        if completed.is_none() {
            self.decoder = Some(decoder);
        }
        Ok(completed)
    }

    /// Feed a slice, stopping at the first complete value.
    ///
    /// Bytes after the completed value are left untouched; compare
    /// [`bytes_parsed`](ValueParser::bytes_parsed) before and after to learn
    /// how much of the slice was consumed.
    pub fn parse_bytes(&mut self, bytes: &[u8]) -> Result<Option<RespValue>> {
        for &byte in bytes {
            if let Some(value) = self.parse(byte)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
