//! Error type shared by every codec entry point.
//!
//! Decoding never coerces or drops malformed input: each failure is reported
//! as one of the variants below, with the byte offset where it was detected
//! whenever the failure comes from a buffer.
use crate::enums::RType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An integer code or string does not name any variant of `kind`.
    #[error("invalid {kind} value: {value}")]
    InvalidEnumValue { kind: &'static str, value: String },

    /// The buffer is shorter than the format requires, or a field is malformed.
    #[error("decode error at offset {offset}: {reason}")]
    Decode { offset: usize, reason: String },

    /// A record header carries an rtype with no known layout.
    #[error("invalid record type {rtype:#04x} at offset {offset}")]
    InvalidRecordType { rtype: u8, offset: usize },

    #[error("unknown instrument id {0}")]
    UnknownInstrument(u32),

    /// A value cannot be represented in the wire format.
    #[error("encode error: {0}")]
    Encode(String),

    /// A stream mixes record layouts where a single one was expected.
    #[error("record type mismatch at record {index}: expected {expected}, found {found}")]
    RTypeMismatch {
        index: usize,
        expected: RType,
        found: RType,
    },

    /// A report frame failed its length or CRC check.
    #[error("report frame {frame}: {reason}")]
    Frame { frame: usize, reason: String },

    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn decode(offset: usize, reason: impl Into<String>) -> Self {
        Error::Decode {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_enum(kind: &'static str, value: impl ToString) -> Self {
        Error::InvalidEnumValue {
            kind,
            value: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
