//! Error values returned by every fallible operation of this crate.

use crate::codec::Compression;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while registering content types, writing or
/// reading XNB files.
#[derive(Debug, Error)]
pub enum Error {
    /// The stream does not start with the `XNB` signature.
    #[error("not an xnb file (found signature {found:?})")]
    NotAnXnbFile { found: Vec<u8> },

    #[error("unsupported format version {version} (highest known is {max})")]
    UnsupportedFormatVersion { version: u8, max: u8 },

    #[error("malformed header: {reason}")]
    MalformedHeader { reason: &'static str },

    #[error("payload length mismatch: declared {declared} bytes, got {actual}")]
    PayloadLengthMismatch { declared: usize, actual: usize },

    /// No reader is registered for this type id. Usually means the asset was
    /// built against a richer registry than the one loading it.
    #[error("unknown content type `{type_id}`")]
    UnknownType { type_id: String },

    #[error("content type `{type_id}` has version {file} in file but {registered} is registered")]
    TypeVersionMismatch {
        type_id: String,
        file: i32,
        registered: i32,
    },

    #[error("`{type_id}` nests deeper than the limit of {limit}")]
    TypeNestingTooDeep { type_id: String, limit: usize },

    #[error("content type `{type_id}` already registered with version {existing} (attempted {attempted})")]
    DuplicateTypeConflict {
        type_id: String,
        existing: i32,
        attempted: i32,
    },

    /// An inline (non-shared) object reaches itself again.
    #[error("cyclic reference through node {node} which is not shared")]
    CyclicReference { node: usize },

    #[error("truncated stream: needed {needed} bytes, only {available} remain")]
    TruncatedStream { needed: usize, available: usize },

    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },

    #[error("malformed `{type_id}` content: {reason}")]
    MalformedContent { type_id: String, reason: String },

    #[error("shared reference {index} points outside of the {count} shared slots")]
    DanglingSharedReference { index: usize, count: usize },

    #[error("corrupt {codec:?} payload: {reason}")]
    CorruptPayload { codec: Compression, reason: String },

    #[error("payload of {declared} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { declared: usize, limit: usize },

    #[error("asset was built for platform tag {found:?}, expected {expected:?}")]
    PlatformMismatch { expected: u8, found: u8 },

    #[error("`{type_id}` is not a valid content type id")]
    InvalidTypeId { type_id: String },

    /// The reader context already finished or failed.
    #[error("reader context can not be reused")]
    ContextConsumed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Field-less mirror of [`Error`] variants. Useful to record a failure
/// without keeping the error value around.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorKind {
    NotAnXnbFile,
    UnsupportedFormatVersion,
    MalformedHeader,
    PayloadLengthMismatch,
    UnknownType,
    TypeVersionMismatch,
    TypeNestingTooDeep,
    DuplicateTypeConflict,
    CyclicReference,
    TruncatedStream,
    TypeMismatch,
    MalformedContent,
    DanglingSharedReference,
    CorruptPayload,
    PayloadTooLarge,
    PlatformMismatch,
    InvalidTypeId,
    ContextConsumed,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotAnXnbFile { .. } => ErrorKind::NotAnXnbFile,
            Error::UnsupportedFormatVersion { .. } => ErrorKind::UnsupportedFormatVersion,
            Error::MalformedHeader { .. } => ErrorKind::MalformedHeader,
            Error::PayloadLengthMismatch { .. } => ErrorKind::PayloadLengthMismatch,
            Error::UnknownType { .. } => ErrorKind::UnknownType,
            Error::TypeVersionMismatch { .. } => ErrorKind::TypeVersionMismatch,
            Error::TypeNestingTooDeep { .. } => ErrorKind::TypeNestingTooDeep,
            Error::DuplicateTypeConflict { .. } => ErrorKind::DuplicateTypeConflict,
            Error::CyclicReference { .. } => ErrorKind::CyclicReference,
            Error::TruncatedStream { .. } => ErrorKind::TruncatedStream,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::MalformedContent { .. } => ErrorKind::MalformedContent,
            Error::DanglingSharedReference { .. } => ErrorKind::DanglingSharedReference,
            Error::CorruptPayload { .. } => ErrorKind::CorruptPayload,
            Error::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Error::PlatformMismatch { .. } => ErrorKind::PlatformMismatch,
            Error::InvalidTypeId { .. } => ErrorKind::InvalidTypeId,
            Error::ContextConsumed => ErrorKind::ContextConsumed,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn malformed(type_id: impl ToString, reason: impl Into<String>) -> Self {
        Error::MalformedContent {
            type_id: type_id.to_string(),
            reason: reason.into(),
        }
    }
}
