use std::fmt;

use thiserror::Error;

use crate::limits::MAX_PAYLOAD_BYTES;

/// Byte length of the fixed prefix of a `ChallengeResponse` payload
/// (difficulty, timestamp and random data; the identity follows).
pub const CHALLENGE_RESPONSE_MIN_BYTES: usize = 41;

/// Exact byte length of a `Solution` payload.
pub const SOLUTION_PAYLOAD_BYTES: usize = 8;

/// Byte length of the fixed prefix of an `Error` payload (the code; the
/// message text follows).
pub const ERROR_MIN_BYTES: usize = 2;

/// Errors produced while encoding or decoding protocol frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// A frame declared a payload larger than the protocol allows. Raised
    /// before any payload memory is allocated.
    #[error("declared payload length {declared} exceeds the {MAX_PAYLOAD_BYTES} byte limit")]
    OversizedPayload { declared: u32 },
    /// The single-byte type tag did not name any known message.
    #[error("unknown message type 0x{0:02x}")]
    UnknownKind(u8),
    /// The two-byte error code did not name any known error.
    #[error("unknown error code {0}")]
    UnknownErrorCode(u16),
    /// The payload length does not fit the declared message variant.
    #[error("{kind} payload has invalid length {actual}")]
    InvalidPayloadLength { kind: MessageKind, actual: usize },
    /// A text field carried bytes that are not valid UTF-8.
    #[error("payload text is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// The underlying transport failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Single-byte message type tags carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ChallengeRequest,
    ChallengeResponse,
    Solution,
    Quote,
    Error,
}

impl MessageKind {
    /// Maps a wire tag back to a message kind.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::ChallengeRequest),
            0x02 => Some(Self::ChallengeResponse),
            0x03 => Some(Self::Solution),
            0x04 => Some(Self::Quote),
            0x05 => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns the wire tag for this message kind.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::ChallengeRequest => 0x01,
            Self::ChallengeResponse => 0x02,
            Self::Solution => 0x03,
            Self::Quote => 0x04,
            Self::Error => 0x05,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ChallengeRequest => "challenge request",
            Self::ChallengeResponse => "challenge response",
            Self::Solution => "solution",
            Self::Quote => "quote",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Stable protocol error codes, carried as big-endian `u16` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidMessage,
    InvalidSolution,
    RateLimitExceeded,
    Timeout,
    InternalError,
}

impl ErrorCode {
    /// Returns the stable wire value of this code.
    #[must_use]
    pub const fn wire_value(self) -> u16 {
        match self {
            Self::InvalidMessage => 1,
            Self::InvalidSolution => 2,
            Self::RateLimitExceeded => 3,
            Self::Timeout => 4,
            Self::InternalError => 5,
        }
    }

    /// Maps a wire value back to a code.
    #[must_use]
    pub fn from_wire(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::InvalidMessage),
            2 => Some(Self::InvalidSolution),
            3 => Some(Self::RateLimitExceeded),
            4 => Some(Self::Timeout),
            5 => Some(Self::InternalError),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidMessage => "invalid message",
            Self::InvalidSolution => "invalid solution",
            Self::RateLimitExceeded => "rate limit exceeded",
            Self::Timeout => "timeout",
            Self::InternalError => "internal error",
        };
        f.write_str(name)
    }
}

/// One protocol message, with its payload fully decoded.
///
/// All multi-byte integers are big-endian on the wire; text fields are
/// UTF-8. Payload layouts follow the frame header of
/// `[1: type][4: length][length: payload]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client asks for a challenge. Empty payload.
    ChallengeRequest,
    /// Server commits to a challenge:
    /// `[1: difficulty][8: timestamp][32: random][rest: identity]`.
    ChallengeResponse {
        difficulty: u8,
        unix_seconds: i64,
        random: [u8; 32],
        identity: String,
    },
    /// Client presents a solution: `[8: nonce]`.
    Solution { nonce: u64 },
    /// Server delivers the payload text: `[rest: utf8]`.
    Quote { text: String },
    /// Server reports a failure: `[2: code][rest: utf8 message]`.
    Error { code: ErrorCode, message: String },
}

impl Message {
    /// Returns the kind tag this message travels under.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::ChallengeRequest => MessageKind::ChallengeRequest,
            Self::ChallengeResponse { .. } => MessageKind::ChallengeResponse,
            Self::Solution { .. } => MessageKind::Solution,
            Self::Quote { .. } => MessageKind::Quote,
            Self::Error { .. } => MessageKind::Error,
        }
    }

    /// Encodes the payload bytes for this message.
    #[must_use]
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Self::ChallengeRequest => Vec::new(),
            Self::ChallengeResponse {
                difficulty,
                unix_seconds,
                random,
                identity,
            } => {
                let mut payload =
                    Vec::with_capacity(CHALLENGE_RESPONSE_MIN_BYTES + identity.len());
                payload.push(*difficulty);
                payload.extend_from_slice(&unix_seconds.to_be_bytes());
                payload.extend_from_slice(random);
                payload.extend_from_slice(identity.as_bytes());
                payload
            }
            Self::Solution { nonce } => nonce.to_be_bytes().to_vec(),
            Self::Quote { text } => text.as_bytes().to_vec(),
            Self::Error { code, message } => {
                let mut payload = Vec::with_capacity(ERROR_MIN_BYTES + message.len());
                payload.extend_from_slice(&code.wire_value().to_be_bytes());
                payload.extend_from_slice(message.as_bytes());
                payload
            }
        }
    }

    /// Decodes a payload for the given kind.
    ///
    /// A payload whose length does not fit the declared variant is a
    /// protocol error, as is an unknown error code.
    pub fn decode(kind: MessageKind, payload: &[u8]) -> Result<Self, WireError> {
        match kind {
            MessageKind::ChallengeRequest => {
                if !payload.is_empty() {
                    return Err(WireError::InvalidPayloadLength {
                        kind,
                        actual: payload.len(),
                    });
                }
                Ok(Self::ChallengeRequest)
            }
            MessageKind::ChallengeResponse => {
                if payload.len() < CHALLENGE_RESPONSE_MIN_BYTES {
                    return Err(WireError::InvalidPayloadLength {
                        kind,
                        actual: payload.len(),
                    });
                }
                let difficulty = payload[0];
                let unix_seconds = i64::from_be_bytes(
                    payload[1..9].try_into().expect("slice is 8 bytes"),
                );
                let mut random = [0u8; 32];
                random.copy_from_slice(&payload[9..CHALLENGE_RESPONSE_MIN_BYTES]);
                let identity =
                    String::from_utf8(payload[CHALLENGE_RESPONSE_MIN_BYTES..].to_vec())?;
                Ok(Self::ChallengeResponse {
                    difficulty,
                    unix_seconds,
                    random,
                    identity,
                })
            }
            MessageKind::Solution => {
                if payload.len() != SOLUTION_PAYLOAD_BYTES {
                    return Err(WireError::InvalidPayloadLength {
                        kind,
                        actual: payload.len(),
                    });
                }
                let nonce =
                    u64::from_be_bytes(payload.try_into().expect("slice is 8 bytes"));
                Ok(Self::Solution { nonce })
            }
            MessageKind::Quote => Ok(Self::Quote {
                text: String::from_utf8(payload.to_vec())?,
            }),
            MessageKind::Error => {
                if payload.len() < ERROR_MIN_BYTES {
                    return Err(WireError::InvalidPayloadLength {
                        kind,
                        actual: payload.len(),
                    });
                }
                let value =
                    u16::from_be_bytes(payload[..2].try_into().expect("slice is 2 bytes"));
                let code =
                    ErrorCode::from_wire(value).ok_or(WireError::UnknownErrorCode(value))?;
                let message = String::from_utf8(payload[2..].to_vec())?;
                Ok(Self::Error { code, message })
            }
        }
    }
}
