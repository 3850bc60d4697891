//! Protocol module - RESP value model, incremental decoders, and framing.
//!
//! This module implements the RESP2/RESP3 wire protocol:
//! - [`RespValue`] model with typed accessors and the outbound encoder
//! - Incremental [`ValueParser`] built from three byte-at-a-time decoders
//! - [`FrameBuffer`] for accumulating arbitrarily-fragmented reads

mod decoder;
mod frame_buffer;
mod value;

pub use decoder::ValueParser;
pub use frame_buffer::FrameBuffer;
pub use value::{PushKind, PushMessage, RespValue};
