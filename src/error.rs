use thiserror::Error;

/// Transport and parsing errors, surfaced at the wire boundary.
///
/// This mirrors the teacher crate's `CanOpenError`: Object Dictionary access
/// failures use the separate [`crate::od::Odr`] taxonomy instead, since those
/// map to SDO abort codes rather than transport failures.
#[derive(Error, Debug)]
pub enum CanOpenError {
    #[error("overflow error: {0}")]
    Overflow(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("frame is not a valid {0} message")]
    BadMessage(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("CAN version mismatch: {0}")]
    CanVersion(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown message type with COB-ID: {0:#x}")]
    UnknownFrameType(u32),

    #[error("not yet implemented: {0}")]
    NotYetImplemented(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the top-level init/communication-reset sequence.
///
/// Mirrors CANopenNode's `CO_ReturnError_t`; only the variants this crate's
/// init path can actually produce are kept (SDO file transfer, CRC and
/// baud-rate-table concerns are out of scope, §1).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    #[error("illegal argument")]
    IllegalArgument,
    #[error("out of memory")]
    OutOfMemory,
    #[error("object dictionary entry 0x{0:04x} missing or malformed")]
    OdParameters(u16),
    #[error("timeout")]
    Timeout,
    #[error("node-id not configured (LSS required)")]
    NodeIdUnconfiguredLss,
}
