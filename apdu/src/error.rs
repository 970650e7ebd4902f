// Copyright (c) 2022-2023 The MobileCoin Foundation

/// Protocol level errors, raised for malformed frames and failed integrity checks
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ApduError {
    /// Payload does not fit a single frame
    #[error("payload of {0} bytes exceeds frame maximum")]
    PayloadTooLarge(usize),

    /// Secure channel envelope needs more fragments than P1/P2 can index
    #[error("secure channel envelope requires {0} fragments")]
    TooManyFragments(usize),

    /// Frame header fields are inconsistent
    #[error("invalid frame header")]
    InvalidHeader,

    /// Buffer too short for the expected encoding
    #[error("invalid length")]
    InvalidLength,

    /// XOR checksum did not match payload
    #[error("checksum mismatch (expected: {expected:02x}, actual: {actual:02x})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Response shorter than a status word
    #[error("response too short ({0} bytes)")]
    ShortResponse(usize),

    /// Secure channel response echoed a different salt
    #[error("secure channel salt mismatch")]
    SaltMismatch,

    /// Secure channel hash did not match the carried data
    #[error("secure channel integrity check failed")]
    IntegrityMismatch,

    /// Unsupported secure channel version
    #[error("unsupported secure channel version {0}")]
    ChannelVersion(u8),

    /// Envelope requested payload encryption
    #[error("encrypted secure channel envelopes are not supported")]
    EncryptedEnvelope,

    /// Low level encoding failure
    #[error("encoding failed")]
    Encoding,
}

impl From<encdec::Error> for ApduError {
    fn from(e: encdec::Error) -> Self {
        match e {
            encdec::Error::Length => ApduError::InvalidLength,
            _ => ApduError::Encoding,
        }
    }
}
