//! Frame buffer for accumulating partial reads.
//!
//! Bridges a byte source that delivers data in arbitrary chunks to the
//! [`ValueParser`]. Bytes accumulate in a single `BytesMut`; each push runs
//! the parser over the buffered bytes, advances the cursor by exactly the
//! parser's consumed-byte count, and starts a fresh parser after every
//! completed value — a single read may surface several back-to-back values,
//! and a trailing partial value stays buffered (with live parser state) for
//! the next push.
//!
//! There is no outbound half: RESP is self-delimiting, so encoded values are
//! written to the transport as opaque blocks.

use bytes::BytesMut;

use super::decoder::ValueParser;
use super::value::RespValue;
use crate::error::Result;

/// Accumulator turning fragmented reads into complete values.
pub struct FrameBuffer {
    /// Bytes received but not yet consumed by the parser.
    buffer: BytesMut,
    /// Parser for the value currently in flight.
    parser: ValueParser,
}

impl FrameBuffer {
    /// Create an empty frame buffer.
    pub fn new() -> Self {
        FrameBuffer {
            buffer: BytesMut::with_capacity(16 * 1024),
            parser: ValueParser::new(),
        }
    }

    /// Push data and extract every complete value.
    ///
    /// Returns the values completed by this push (possibly none). Fragmented
    /// trailing data is buffered internally for the next call.
    ///
    /// # Errors
    ///
    /// Parse errors are not recoverable; the byte-stream position can no
    /// longer be trusted and the connection must be torn down.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<RespValue>> {
        self.buffer.extend_from_slice(data);

        let mut values = Vec::new();
        while !self.buffer.is_empty() {
            let before = self.parser.bytes_parsed();
            let completed = self.parser.parse_bytes(&self.buffer)?;
            let consumed = self.parser.bytes_parsed() - before;
            let _ = self.buffer.split_to(consumed);

            match completed {
                Some(value) => {
                    values.push(value);
                    self.parser = ValueParser::new();
                }
                None => break,
            }
        }
        Ok(values)
    }

    /// Number of buffered bytes not yet consumed by the parser.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check whether no unconsumed bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered bytes and reset parser state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.parser = ValueParser::new();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
