//! Core primitives for the powgate proof-of-work quote service.
//!
//! The crate provides strongly typed helpers around the immutable wire
//! format and the hashcash challenge scheme so that server and client
//! binaries share one hashing and encoding behaviour: the framed message
//! codec, the challenge generate/verify/solve operations, and the
//! leading-zero-bit accounting both sides must agree on exactly.

pub mod challenge;
mod hash;
pub mod limits;
pub mod wire;

pub use crate::challenge::{Challenge, NonceSpaceExhausted, RandomnessError};
pub use crate::hash::{count_leading_zero_bits, sha256};
pub use crate::limits::MAX_PAYLOAD_BYTES;
pub use crate::wire::{ErrorCode, Message, MessageKind, WireError};
