//! Error types for netloc.
//!
//! - [`Error`] - the crate-wide error enum
//! - [`DecodeErrorKind`] - why a BER/SNMP decode failed
//! - [`CryptoErrorKind`] - why a USM crypto operation failed
//!
//! Errors are boxed: `Result<T> = Result<T, Box<Error>>`.
//!
//! ```rust
//! use netloc::{Error, Result};
//!
//! fn describe(result: Result<()>) -> String {
//!     match result {
//!         Ok(()) => "ok".into(),
//!         Err(e) if e.is_conflict() => "lost a write race".into(),
//!         Err(e) => match &*e {
//!             Error::Timeout { target, .. } => format!("{target} did not answer"),
//!             Error::Validation { field, .. } => format!("bad {field}"),
//!             other => other.to_string(),
//!         },
//!     }
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

/// Result type alias using the crate's boxed error.
pub type Result<T> = std::result::Result<T, Box<Error>>;

/// The main error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Local socket failure (bind, recv).
    #[error("I/O error{}: {source}", .target.map(|t| format!(" on {t}")).unwrap_or_default())]
    Io {
        target: Option<SocketAddr>,
        #[source]
        source: std::io::Error,
    },

    /// Sending to a peer failed.
    #[error("network error communicating with {target}: {source}")]
    Network {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Malformed BER or SNMP structure.
    #[error("decode error at offset {offset}: {kind}")]
    Decode {
        offset: usize,
        kind: DecodeErrorKind,
    },

    /// SNMPv3 authentication failed (HMAC mismatch or missing auth key).
    #[error("authentication failed for message from {target}")]
    Auth { target: SocketAddr },

    /// SNMPv3 encryption or decryption failed.
    #[error("crypto error: {kind}")]
    Crypto { kind: CryptoErrorKind },

    /// No security profile registered for a v3 engine id.
    #[error("no security profile for engine id {engine_id} (from {target})")]
    UnknownSecurityProfile { target: SocketAddr, engine_id: String },

    /// Security profile rejected at registration time.
    #[error("invalid security profile for {engine_id}: {reason}")]
    InvalidSecurityProfile { engine_id: String, reason: String },

    /// No response within the caller's timeout.
    #[error("timeout after {elapsed:?} waiting for {target} (request {request_id})")]
    Timeout {
        target: SocketAddr,
        elapsed: Duration,
        request_id: i32,
    },

    /// Dispatcher socket is not bound yet.
    #[error("dispatcher for port {port} is not bound")]
    NotBound { port: u16 },

    /// The dispatcher actor has shut down.
    #[error("dispatcher is closed")]
    Closed,

    /// Optimistic concurrency check failed for a document.
    #[error("write conflict on {key}")]
    Conflict { key: String },

    /// A read-modify-write kept losing races.
    #[error("gave up on {key} after {attempts} conflicting writes")]
    ConflictRetriesExhausted { key: String, attempts: u32 },

    /// Document does not exist.
    #[error("document {key} not found")]
    NotFound { key: String },

    /// Rejected input; nothing was persisted.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Document could not be (de)serialized.
    #[error("serialization error for {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Box this error.
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    /// Shorthand for a boxed decode error.
    pub(crate) fn decode(offset: usize, kind: DecodeErrorKind) -> Box<Self> {
        tracing::debug!(target: "netloc::ber", { offset, %kind }, "decode error");
        Error::Decode { offset, kind }.boxed()
    }

    /// Shorthand for a boxed validation error.
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Box<Self> {
        Error::Validation {
            field,
            reason: reason.into(),
        }
        .boxed()
    }

    /// Shorthand for a boxed crypto error.
    pub(crate) fn crypto(kind: CryptoErrorKind) -> Box<Self> {
        Error::Crypto { kind }.boxed()
    }

    /// True for a lost optimistic-concurrency race that may be retried.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// True for an expired request.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Why a decode failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    TruncatedData,
    InsufficientData { needed: usize, available: usize },
    UnexpectedTag { expected: u8, actual: u8 },
    IndefiniteLength,
    InvalidLength,
    LengthTooLong { octets: usize },
    LengthExceedsMax { length: usize, max: usize },
    ZeroLengthInteger,
    Integer64TooLong { length: usize },
    IntegerOverflow,
    InvalidNull,
    InvalidIpAddressLength { length: usize },
    OidTooLong { count: usize, max: usize },
    UnknownVersion(i32),
    UnknownPduType(u8),
    InvalidMsgFlags,
    InvalidMsgFlagsLength { length: usize },
    InvalidMsgId { value: i32 },
    MsgMaxSizeTooSmall { value: i32, minimum: i32 },
    UnknownSecurityModel(i32),
    InvalidEngineBoots { value: i32 },
    InvalidEngineTime { value: i32 },
    UnexpectedEncryption,
    ExpectedEncryption,
    TrailingData { remaining: usize },
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TruncatedData => write!(f, "unexpected end of data"),
            Self::InsufficientData { needed, available } => {
                write!(f, "need {needed} bytes, have {available}")
            }
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "expected tag 0x{expected:02X}, got 0x{actual:02X}")
            }
            Self::IndefiniteLength => write!(f, "indefinite length encoding not supported"),
            Self::InvalidLength => write!(f, "invalid length encoding"),
            Self::LengthTooLong { octets } => write!(f, "length uses {octets} octets"),
            Self::LengthExceedsMax { length, max } => {
                write!(f, "length {length} exceeds maximum {max}")
            }
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::Integer64TooLong { length } => write!(f, "64-bit integer of {length} bytes"),
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::InvalidNull => write!(f, "NULL with non-zero length"),
            Self::InvalidIpAddressLength { length } => {
                write!(f, "IpAddress of {length} bytes, expected 4")
            }
            Self::OidTooLong { count, max } => write!(f, "OID has {count} arcs, max {max}"),
            Self::UnknownVersion(v) => write!(f, "unknown SNMP version {v}"),
            Self::UnknownPduType(t) => write!(f, "unknown PDU type 0x{t:02X}"),
            Self::InvalidMsgFlags => write!(f, "invalid msgFlags"),
            Self::InvalidMsgFlagsLength { length } => {
                write!(f, "msgFlags of {length} bytes, expected 1")
            }
            Self::InvalidMsgId { value } => write!(f, "invalid msgID {value}"),
            Self::MsgMaxSizeTooSmall { value, minimum } => {
                write!(f, "msgMaxSize {value} below minimum {minimum}")
            }
            Self::UnknownSecurityModel(m) => write!(f, "unknown security model {m}"),
            Self::InvalidEngineBoots { value } => write!(f, "invalid engine boots {value}"),
            Self::InvalidEngineTime { value } => write!(f, "invalid engine time {value}"),
            Self::UnexpectedEncryption => write!(f, "unexpected encrypted scoped PDU"),
            Self::ExpectedEncryption => write!(f, "expected encrypted scoped PDU"),
            Self::TrailingData { remaining } => write!(f, "{remaining} trailing bytes"),
        }
    }
}

/// Why a USM crypto operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CryptoErrorKind {
    InvalidKeyLength,
    InvalidPrivParamsLength { expected: usize, actual: usize },
    MissingAuthParams,
}

impl std::fmt::Display for CryptoErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKeyLength => write!(f, "invalid key length"),
            Self::InvalidPrivParamsLength { expected, actual } => {
                write!(f, "privParameters of {actual} bytes, expected {expected}")
            }
            Self::MissingAuthParams => write!(f, "no authentication parameters in message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_predicate() {
        let err = Error::Conflict {
            key: "swport-10.0.0.1-Gi1/0/1".into(),
        };
        assert!(err.is_conflict());
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "write conflict on swport-10.0.0.1-Gi1/0/1");
    }

    #[test]
    fn test_io_display_without_target() {
        let err = Error::Io {
            target: None,
            source: std::io::Error::other("boom"),
        };
        assert_eq!(err.to_string(), "I/O error: boom");
    }

    #[test]
    fn test_decode_kind_display() {
        let kind = DecodeErrorKind::UnexpectedTag {
            expected: 0x30,
            actual: 0x02,
        };
        assert_eq!(kind.to_string(), "expected tag 0x30, got 0x02");
    }
}
