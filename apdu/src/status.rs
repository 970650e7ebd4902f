// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device status words

use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter};

/// Closed vocabulary of device status words.
///
/// Codes outside this set are surfaced to callers with the raw value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter, TryFromPrimitive)]
#[repr(u16)]
pub enum Status {
    /// Command succeeded
    Success = 0x9000,

    /// Wrong command length
    WrongLength = 0x6700,

    /// Command signature or nonce rejected
    SecurityStatus = 0x6982,

    /// Device locked
    Locked = 0x6983,

    /// User rejected the operation on the device
    UserCancelled = 0x6985,

    /// Malformed command data
    WrongData = 0x6a80,

    /// Application not registered with the device
    NotRegistered = 0x6a81,

    /// Script type not supported by the loaded script
    WrongScriptType = 0x6a82,

    /// Command issued out of transaction order
    WrongTxState = 0x6a86,

    /// Invalid P1 / P2
    WrongParams = 0x6b00,

    /// Instruction not supported
    InsNotSupported = 0x6d00,

    /// Class not supported
    ClaNotSupported = 0x6e00,

    /// Internal device error
    Internal = 0x6f00,
}

impl Status {
    /// Raw status word
    pub fn code(&self) -> u16 {
        *self as u16
    }
}
