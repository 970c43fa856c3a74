//! Marker-bit framing for the bitlink protocol.
//!
//! Every frame starts with one byte whose top bit is set; all following
//! bytes carry a cleared top bit. That single marker bit is the whole
//! synchronization story: a receiver can join (or rejoin) the stream at any
//! byte and lock onto the next frame start. The price is that each raw byte
//! carries only 7 usable bits, so logical 8-bit bytes are packed across raw
//! bytes as a continuous MSB-first bit stream.
//!
//! [`codec`] holds the bit-level pack/unpack and the exact frame sizing
//! rule; [`receiver`] holds the byte-at-a-time state machine that finds,
//! accumulates, and decodes frames from the raw stream.

pub mod codec;
pub mod error;
pub mod receiver;

pub use codec::{
    encode_frame, encode_read_request, encoded_len, FrameKind, RawFrame, MAX_LOGICAL, MAX_PAYLOAD,
    MAX_RAW, START_MARKER,
};
pub use error::{FrameError, Result};
pub use receiver::{Event, FrameReceiver};
