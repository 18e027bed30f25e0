//! Length-prefixed binary framing for the supervisor <-> worker pipes.
//!
//! Wire layout is little-endian and packed: a fixed 8-byte header
//! `(length: u32, type: u8, flags: u8, seq: u16)` followed by `length`
//! payload bytes. The type values are wire ABI and must never be
//! renumbered; unknown values are carried through as raw bytes so
//! receivers can treat them as no-ops instead of errors.

pub mod frame;
pub mod payload;
pub mod reader;

pub use frame::{
    Frame, FrameFlags, FrameHeader, HEADER_LEN, MessageType, encode_frame, encode_frame_raw,
};
pub use payload::{
    ScalarType, TypedArray, decode_surface, decode_surface_delta, decode_typed_array,
    encode_surface, encode_surface_delta, encode_typed_array,
};
pub use reader::{DEFAULT_MAX_PAYLOAD, FrameReader};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("payload of {length} bytes exceeds limit {max}")]
    OversizeFrame { length: u32, max: u32 },
    #[error("payload truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("unknown scalar tag {0}")]
    BadScalarTag(u8),
    #[error("payload length {len} is not a multiple of element size {elem}")]
    RaggedArray { len: usize, elem: usize },
    #[error("surface metadata is not valid JSON: {0}")]
    MetaJson(#[from] serde_json::Error),
    #[error(transparent)]
    Surface(#[from] core_surface::SurfaceError),
}
