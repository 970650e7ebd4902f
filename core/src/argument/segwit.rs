// Copyright (c) 2022-2023 The MobileCoin Foundation

use super::{
    check_final_sequences, encode_output_block, encode_path, ArgumentEncodingStrategy,
    ArgumentFamily,
};
use crate::{
    prepare::{PreparedData, SIGHASH_ALL},
    script::redeem_script,
    types::DEFAULT_SEQUENCE,
    Error, ScriptType,
};

/// Segwit v0 (BIP143) argument encoding
///
/// Global: `version (LE) ‖ hashPrevouts ‖ hashSequence ‖ 0x00000000 ‖
/// output block ‖ 0xffffffff ‖ locktime (LE) ‖ sighash type (LE)`,
/// following BIP143 preimage component ordering.
///
/// Per input: `path ‖ prevout ‖ input type ‖ amount (BE) ‖ len ‖ script`
/// where script is the P2WPKH program (or P2PKH script) for the input key.
///
/// Only final (`0xffffffff`) input sequences can be signed.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SegwitV0;

impl ArgumentEncodingStrategy for SegwitV0 {
    fn family(&self) -> ArgumentFamily {
        ArgumentFamily::SegwitV0
    }

    fn encode_global(&self, data: &PreparedData) -> Result<Vec<u8>, Error> {
        check_final_sequences(data, self.family())?;

        let mut b = Vec::with_capacity(4 + 32 + 32 + 4 + 73 + 4 + 4 + 4);

        b.extend_from_slice(&data.version.to_le_bytes());
        b.extend_from_slice(&data.segwit_hashes.prevouts);
        b.extend_from_slice(&data.segwit_hashes.sequences);
        b.extend_from_slice(&[0u8; 4]);
        b.extend_from_slice(&encode_output_block(data));
        b.extend_from_slice(&DEFAULT_SEQUENCE.to_le_bytes());
        b.extend_from_slice(&data.locktime.to_le_bytes());
        b.extend_from_slice(&SIGHASH_ALL.to_le_bytes());

        Ok(b)
    }

    fn encode_input(&self, data: &PreparedData, index: usize) -> Result<Vec<u8>, Error> {
        let i = data.input(index)?;
        check_final_sequences(data, self.family())?;

        // P2PKH inputs carry their own script, wrapped / native
        // segwit inputs carry the P2WPKH program
        let script = match data.script_type {
            ScriptType::P2pkh => i.script.script.clone(),
            _ => redeem_script(&i.pubkey),
        };

        let mut b = Vec::with_capacity(22 + 36 + 1 + 8 + 1 + script.len());
        b.extend_from_slice(&encode_path(i.purpose, i.address_index));
        b.extend_from_slice(&i.prevout);
        b.push(data.script_type.tag());
        b.extend_from_slice(&i.value.to_be_bytes());
        b.push(script.len() as u8);
        b.extend_from_slice(script.as_bytes());

        Ok(b)
    }
}
