//! Error types for the TCAP codec.

use crate::asn1::Tag;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, TcapError>;

/// Errors raised by the low-level BER/DER engine.
///
/// Offsets are byte positions into the buffer handed to the engine, so a
/// failure deep inside a nested element still points at the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Asn1Error {
    #[error("empty input")]
    EmptyInput,

    #[error("truncated element at offset {0}")]
    Truncated(usize),

    #[error("declared length {length} exceeds {remaining} remaining bytes at offset {offset}")]
    LengthOverrun {
        offset: usize,
        length: usize,
        remaining: usize,
    },

    #[error("invalid length octets at offset {0}")]
    InvalidLength(usize),

    #[error("indefinite length at offset {0} (not DER)")]
    IndefiniteLength(usize),

    #[error("indefinite length on a primitive tag at offset {0}")]
    IndefiniteLengthOnPrimitive(usize),

    #[error("tag number too large at offset {0}")]
    TagTooLarge(usize),

    #[error("expected {expected} at offset {offset}, found {found}")]
    UnexpectedTag {
        offset: usize,
        expected: Tag,
        found: Tag,
    },

    #[error("malformed fragment in constructed string (tag {tag}): {reason}")]
    MalformedFragment { tag: u32, reason: &'static str },

    #[error("nesting exceeds {0} levels")]
    DepthExceeded(usize),

    #[error("trailing bytes after element at offset {0}")]
    TrailingData(usize),

    #[error("integer content is empty")]
    EmptyInteger,

    #[error("integer of {0} bytes exceeds the supported 8-byte range")]
    IntegerTooLarge(usize),

    #[error("invalid object identifier encoding")]
    InvalidOid,
}

/// TCAP codec errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TcapError {
    #[error("empty data provided")]
    EmptyData,

    #[error("unknown message type: {0}")]
    UnknownMessageType(Tag),

    #[error("{field} must be 1 to 4 bytes in length, got {len} bytes")]
    InvalidTransactionId { field: &'static str, len: usize },

    #[error("{field} must be in range -128 to 127, got {value}")]
    InvalidInvokeId { field: &'static str, value: i64 },

    #[error("message has no component to encode")]
    EmptyMessage,

    #[error("decode failed in {operation}.{field}")]
    Decode {
        operation: &'static str,
        field: &'static str,
        #[source]
        source: Asn1Error,
    },

    #[error("encode failed in {operation}.{field}")]
    Encode {
        operation: &'static str,
        field: &'static str,
        #[source]
        source: Asn1Error,
    },
}

impl TcapError {
    pub(crate) fn decode(operation: &'static str, field: &'static str, source: Asn1Error) -> Self {
        Self::Decode {
            operation,
            field,
            source,
        }
    }

    pub(crate) fn encode(operation: &'static str, field: &'static str, source: Asn1Error) -> Self {
        Self::Encode {
            operation,
            field,
            source,
        }
    }

    /// True when the failure was caused by a BER indefinite length, the one
    /// condition [`crate::Tcap::parse_any`] recovers from by
    /// canonicalising.
    pub fn is_indefinite_length(&self) -> bool {
        matches!(
            self,
            Self::Decode {
                source: Asn1Error::IndefiniteLength(_)
                    | Asn1Error::IndefiniteLengthOnPrimitive(_),
                ..
            }
        )
    }
}
