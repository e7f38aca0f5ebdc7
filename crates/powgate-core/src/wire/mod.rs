//! Framed binary wire protocol.
//!
//! Every exchange is a sequence of typed, length-prefixed frames. The codec
//! is pure apart from the read/write adapters in [`frame`]; payload
//! encoding and decoding never touch the transport.

mod frame;
mod message;

pub use frame::{read_message, write_message};
pub use message::{
    ErrorCode, Message, MessageKind, WireError, CHALLENGE_RESPONSE_MIN_BYTES, ERROR_MIN_BYTES,
    SOLUTION_PAYLOAD_BYTES,
};
