//! Error types for persistence, datum decoding and streaming sessions.

use thiserror::Error;

/// Errors raised by providers and the recovery protocol.
///
/// These are fatal to the in-memory entity instance that hit them and are
/// meant to be propagated to whatever supervises it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Entity {entity} cannot persist while {state}")]
    NotReady { entity: String, state: String },

    #[error("Entity {entity} has already started recovery")]
    AlreadyRecovered { entity: String },

    #[error("Out of order event for {entity}: expected index {expected}, got {got}")]
    EventOutOfOrder {
        entity: String,
        expected: u64,
        got: u64,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure to decode a transport part as a datum.
///
/// Every variant names the part it came from so callers can report which
/// piece of a multipart body was rejected.
#[derive(Debug, Error)]
pub enum DatumError {
    #[error("Part {part} cannot be read as a datum: {header} header is not present")]
    MissingHeader { part: String, header: &'static str },

    #[error("Invalid error datum content type {content_type:?} on part {part}, must be text/plain")]
    InvalidContentType { part: String, content_type: String },

    #[error("Invalid stageref datum in part {part}: {value:?} is not a valid stage id")]
    InvalidStageId { part: String, value: String },

    #[error("Invalid httpresp datum in part {part}: {value:?} is not a valid result code")]
    InvalidResultCode { part: String, value: String },

    #[error("Invalid httpreq datum in part {part}: http method {method} is invalid")]
    InvalidMethod { part: String, method: String },

    #[error("Unrecognised datum type {datum_type:?} in part {part}")]
    UnrecognizedType { part: String, datum_type: String },

    #[error("Failed to read body of part {part}: {source}")]
    UnreadableBody {
        part: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that terminate a live-streaming session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid command: {0}")]
    InvalidCommand(#[from] serde_json::Error),

    #[error("Unsupported command type {0}")]
    UnsupportedCommand(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
