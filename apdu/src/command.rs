// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command definitions
//!
//! A [Command] is the `CLA / INS / P1 / P2` identity of a device operation,
//! along with the processor it targets (which determines response layout).

use num_enum::TryFromPrimitive;
use sha2::{Digest, Sha256};
use strum::{Display, EnumIter, EnumString};

use crate::{MCU_CLA, SE_CLA};

/// Processor targeted by a command
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString)]
pub enum Target {
    /// Secure element, status word trails response data
    Se,
    /// Micro-controller, status word leads response data
    Mcu,
}

/// Device instruction codes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter, TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    /// Fetch a single-use nonce for command signing
    GetNonce = 0x46,

    /// Fetch the secure element firmware version
    GetSeVersion = 0x52,

    /// Power off the device
    PowerOff = 0x80,

    /// Execute the global transaction argument
    ExecuteScript = 0xa2,

    /// Execute a per-input argument
    ExecuteUtxo = 0xa3,

    /// Complete transaction preparation
    FinishPrepare = 0xa4,

    /// Display transaction detail, awaiting user confirmation
    GetTxDetail = 0xa6,

    /// Fetch the signature decryption key
    GetTxKey = 0xa7,

    /// Clear transaction memory
    ClearTx = 0xa8,

    /// Load the signing script
    SendScript = 0xac,

    /// Secure channel fragment
    SendFragment = 0xcc,
}

/// Command identity for a device operation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub target: Target,
}

impl Command {
    pub const GET_NONCE: Command = Command::se(Instruction::GetNonce);
    pub const GET_SE_VERSION: Command = Command::se(Instruction::GetSeVersion);
    pub const SEND_SCRIPT: Command = Command::se(Instruction::SendScript);
    pub const EXECUTE_SCRIPT: Command = Command::se(Instruction::ExecuteScript);
    pub const EXECUTE_UTXO: Command = Command::se(Instruction::ExecuteUtxo);
    pub const FINISH_PREPARE: Command = Command::se(Instruction::FinishPrepare);
    pub const GET_TX_DETAIL: Command = Command::se(Instruction::GetTxDetail);
    pub const GET_TX_KEY: Command = Command::se(Instruction::GetTxKey);
    pub const CLEAR_TX: Command = Command::se(Instruction::ClearTx);
    pub const SEND_FRAGMENT: Command = Command::se(Instruction::SendFragment);
    pub const POWER_OFF: Command = Command::mcu(Instruction::PowerOff);

    /// Create a secure element command with zeroed parameters
    pub const fn se(ins: Instruction) -> Self {
        Self {
            cla: SE_CLA,
            ins: ins as u8,
            p1: 0,
            p2: 0,
            target: Target::Se,
        }
    }

    /// Create an MCU command with zeroed parameters
    pub const fn mcu(ins: Instruction) -> Self {
        Self {
            cla: MCU_CLA,
            ins: ins as u8,
            p1: 0,
            p2: 0,
            target: Target::Mcu,
        }
    }

    /// Override parameter bytes
    pub const fn with_params(self, p1: u8, p2: u8) -> Self {
        Self { p1, p2, ..self }
    }

    /// `CLA ‖ INS ‖ P1 ‖ P2`, covered by command signatures and the secure channel hash
    pub fn header(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    /// Digest signed by the application key for signed commands,
    /// `SHA256(CLA ‖ INS ‖ P1 ‖ P2 ‖ payload ‖ nonce)`
    pub fn signature_digest(&self, payload: &[u8], nonce: &[u8]) -> [u8; 32] {
        Sha256::new()
            .chain_update(self.header())
            .chain_update(payload)
            .chain_update(nonce)
            .finalize()
            .into()
    }

    /// Resolve the [Instruction] for this command, if known
    pub fn instruction(&self) -> Option<Instruction> {
        Instruction::try_from(self.ins).ok()
    }
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (cla, ins, p1, p2) = (self.cla, self.ins, self.p1, self.p2);

        match self.instruction() {
            Some(i) => write!(f, "{i} ({cla:02x}{ins:02x}{p1:02x}{p2:02x})"),
            None => write!(f, "{cla:02x}{ins:02x}{p1:02x}{p2:02x}"),
        }
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn instruction_codes_unique() {
        let mut codes: Vec<u8> = Instruction::iter().map(|i| i as u8).collect();
        let n = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(n, codes.len());
    }

    #[test]
    fn command_header() {
        let c = Command::EXECUTE_UTXO.with_params(0x01, 0x02);
        assert_eq!(c.header(), [0x80, 0xa3, 0x01, 0x02]);
        assert_eq!(c.instruction(), Some(Instruction::ExecuteUtxo));
        assert_eq!(Command::POWER_OFF.target, Target::Mcu);
    }

    #[test]
    fn signature_digest_binds_header() {
        let payload = [0x01, 0x02];
        let nonce = [0xaa; 8];

        let a = Command::EXECUTE_SCRIPT.signature_digest(&payload, &nonce);
        let b = Command::EXECUTE_UTXO.signature_digest(&payload, &nonce);
        let c = Command::EXECUTE_SCRIPT.signature_digest(&payload, &[0xbb; 8]);

        assert_ne!(a, b);
        assert_ne!(a, c);

        let preimage = [&[0x80, 0xa2, 0x00, 0x00, 0x01, 0x02][..], &[0xaa; 8][..]].concat();
        let expected: [u8; 32] = Sha256::digest(preimage).into();
        assert_eq!(a, expected);
    }
}
