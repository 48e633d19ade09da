//! MudMode wire codec.
//!
//! The legacy router protocol serializes one heterogeneous value tree per
//! frame: integers, UTF-8 strings, sequences, string-keyed mappings, and a
//! null marker. Frames are 4-byte big-endian length-prefixed byte blocks.
//!
//! The codec is deterministic: encoding the same value tree always yields the
//! same bytes, and `encode(decode(b)) == b` for any frame produced by a
//! conformant encoder. Interoperability with the reference router's byte
//! layout is load-bearing; any deviation blocks federation.

pub mod codec;
pub mod error;
pub mod value;

pub use {
    codec::{FrameCodec, decode, encode},
    error::WireError,
    value::{Value, ValueMap},
};

/// Default cap on a single frame's payload, in bytes.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Nesting cap for decoded value trees. The protocol never nests more than a
/// few levels; the cap bounds stack use on hostile input.
pub const MAX_DEPTH: usize = 32;
