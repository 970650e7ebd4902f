// Copyright (c) 2022-2023 The MobileCoin Foundation

use seal_apdu::{ApduError, Status};
use seal_core::argument::ArgumentFamily;
use tokio::time::error::Elapsed;

use crate::tx::TxState;

/// Signing library error type
///
/// User cancellation is not an error, see [SignOutcome::Cancelled][crate::SignOutcome].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed frame, checksum or secure channel integrity failure
    #[error("protocol error: {0}")]
    Protocol(#[from] ApduError),

    /// Device returned a known error status
    #[error("device error: {0} ({:04x})", .0.code())]
    Device(Status),

    /// Device returned an unknown status
    #[error("unknown device error: {0:04x}")]
    UnknownDevice(u16),

    /// Transaction engine error (raised before device I/O)
    #[error(transparent)]
    Core(#[from] seal_core::Error),

    /// Transport error
    #[error("transport error: {0}")]
    Transport(anyhow::Error),

    /// Request timeout
    #[error("timeout waiting for device response")]
    RequestTimeout,

    /// Signing flow step issued out of order
    #[error("invalid signing state (actual: {0}, expected: {1})")]
    InvalidState(TxState, TxState),

    /// Unexpected device response
    #[error("unexpected device response")]
    UnexpectedResponse,

    /// No device script configured for the selected argument family
    #[error("no device script configured for {0} arguments")]
    MissingScript(ArgumentFamily),

    /// Returned signature failed local verification
    #[error("signature for input {0} failed verification")]
    SignatureMismatch(usize),

    /// Key provider failure
    #[error("key provider error: {0}")]
    KeyProvider(anyhow::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Map a non-success status word to an error
    pub fn from_status(code: u16) -> Self {
        match Status::try_from(code) {
            Ok(s) => Error::Device(s),
            Err(_) => Error::UnknownDevice(code),
        }
    }

    /// Check whether the error reports a device status
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Device(s) => Some(*s),
            _ => None,
        }
    }
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::RequestTimeout
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            Error::from_status(0x6a81),
            Error::Device(Status::NotRegistered)
        ));
        assert!(matches!(
            Error::from_status(0x6983),
            Error::Device(Status::Locked)
        ));
        assert!(matches!(
            Error::from_status(0x1234),
            Error::UnknownDevice(0x1234)
        ));

        assert_eq!(
            Error::from_status(0x6a82).to_string(),
            "device error: WrongScriptType (6a82)"
        );
    }
}
