//! Crate-wide error taxonomy.
//!
//! Every subsystem returns `crate::error::Result<T>`. Protocol-specific
//! detail lives in the leaf variants so callers can match on `Kind` without
//! caring which engine produced the failure.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("framing error: {0}")]
    Framing(String),

    #[error("device rejected the request: {0}")]
    ProtocolReject(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("device was lost mid-operation")]
    DeviceLost,

    #[error("image is invalid: {0}")]
    ImageInvalid(String),

    #[error("partition '{0}' is protected and was not modified")]
    PartitionProtected(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error(transparent)]
    UsbError(#[from] UsbError),
}

impl Error {
    pub fn framing<S: Into<String>>(msg: S) -> Self {
        Error::Framing(msg.into())
    }

    pub fn proto<S: Into<String>>(msg: S) -> Self {
        Error::ProtocolReject(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Coarse classification used by the CLI for exit-code mapping.
    pub fn kind(&self) -> Kind {
        match self {
            Error::Io(_) => Kind::Io,
            Error::Timeout(_) => Kind::Timeout,
            Error::Framing(_) => Kind::Framing,
            Error::ProtocolReject(_) => Kind::ProtocolReject,
            Error::AuthFailed(_) => Kind::AuthFailed,
            Error::DeviceLost => Kind::DeviceLost,
            Error::ImageInvalid(_) => Kind::ImageInvalid,
            Error::PartitionProtected(_) => Kind::PartitionProtected,
            Error::Cancelled => Kind::Cancelled,
            Error::NotImplemented(_) => Kind::NotImplemented,
            Error::Internal(_) | Error::PathNotFound(_) => Kind::Internal,
            Error::UsbError(_) => Kind::Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Io,
    Timeout,
    Framing,
    ProtocolReject,
    AuthFailed,
    DeviceLost,
    ImageInvalid,
    PartitionProtected,
    Cancelled,
    NotImplemented,
    Internal,
}

/// Transport-layer USB failures, kept distinct so backends can be swapped
/// (`nusb` vs `rusb`) without leaking their error types into the rest of
/// the crate.
#[derive(thiserror::Error, Debug)]
pub enum UsbError {
    #[error("no matching device found")]
    NotFound,

    #[error("failed to open device: {0}")]
    Open(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("device disconnected")]
    Disconnected,
}
