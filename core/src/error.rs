// Copyright (c) 2022-2023 The MobileCoin Foundation

use crate::{
    argument::{ArgumentFamily, FirmwareGeneration},
    ScriptType,
};

/// Transaction engine errors
///
/// All of these are raised prior to (or independent of) device I/O.
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error {
    /// Input public key not resolved prior to preparation
    #[error("input {0} has no resolved public key")]
    MissingInputKey(usize),

    /// Change public key not resolved prior to preparation
    #[error("change has no resolved public key")]
    MissingChangeKey,

    /// Transaction has no inputs
    #[error("transaction has no inputs")]
    NoInputs,

    /// Transaction has no primary output
    #[error("transaction has no output")]
    NoOutput,

    /// Unknown address prefix or script type
    #[error("unsupported script type: {0}")]
    UnsupportedScriptType(String),

    /// Firmware generation cannot sign the requested script type
    #[error("firmware generation {0} does not support {1} inputs")]
    UnsupportedFirmware(FirmwareGeneration, ScriptType),

    /// Address parsing failed or network mismatch
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Amount parsing failed or value out of range
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Extension output data too large
    #[error("extension output too large ({0} bytes)")]
    ExtensionTooLarge(usize),

    /// Public key parsing failed
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Taproot tweak out of range
    #[error("invalid taproot tweak")]
    InvalidTweak,

    /// Input sequence cannot be expressed in the selected argument format
    #[error("input {index} sequence {sequence:08x} not supported by {family} arguments")]
    UnsupportedSequence {
        index: usize,
        sequence: u32,
        family: ArgumentFamily,
    },

    /// Input index out of range
    #[error("input index {0} out of range")]
    InputIndex(usize),

    /// Signature parsing failed or type mismatch
    #[error("invalid signature")]
    InvalidSignature,

    /// Number of signatures does not match inputs
    #[error("expected {expected} signatures, got {actual}")]
    SignatureCount { expected: usize, actual: usize },

    /// Session key has the wrong length
    #[error("invalid session key length ({0} bytes)")]
    InvalidKeyLength(usize),

    /// Signature decryption failed (bad padding)
    #[error("signature decryption failed")]
    Decryption,
}

impl Error {
    /// Check whether this is an input resolution error
    pub fn is_input_resolution(&self) -> bool {
        matches!(self, Error::MissingInputKey(_) | Error::MissingChangeKey)
    }
}
