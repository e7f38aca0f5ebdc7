//! Protocol limits enforced when framing peer traffic.
//!
//! The reader rejects any frame whose declared payload length exceeds these
//! bounds before allocating, which keeps memory usage predictable in the
//! face of hostile peers.

/// Maximum declared payload length of a single frame in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 1_048_576;
