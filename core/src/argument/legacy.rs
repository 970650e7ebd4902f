// Copyright (c) 2022-2023 The MobileCoin Foundation

use super::{
    check_final_sequences, encode_output_block, encode_path, ArgumentEncodingStrategy,
    ArgumentFamily,
};
use crate::{helpers::hash160, prepare::PreparedData, Error};

/// Legacy argument encoding
///
/// Global: `output block ‖ hashPrevouts ‖ hashSequence` (double SHA-256).
/// Per input: `path ‖ prevout ‖ input type ‖ amount (BE) ‖ pubkey hash`.
///
/// The device substitutes scriptCode per input when computing legacy
/// sighashes, the aggregate hashes are carried for wire compatibility.
/// Only final (`0xffffffff`) input sequences can be signed.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Legacy;

impl ArgumentEncodingStrategy for Legacy {
    fn family(&self) -> ArgumentFamily {
        ArgumentFamily::Legacy
    }

    fn encode_global(&self, data: &PreparedData) -> Result<Vec<u8>, Error> {
        check_final_sequences(data, self.family())?;

        let mut b = encode_output_block(data);
        b.extend_from_slice(&data.segwit_hashes.prevouts);
        b.extend_from_slice(&data.segwit_hashes.sequences);
        Ok(b)
    }

    fn encode_input(&self, data: &PreparedData, index: usize) -> Result<Vec<u8>, Error> {
        let i = data.input(index)?;
        check_final_sequences(data, self.family())?;

        let mut b = Vec::with_capacity(22 + 36 + 1 + 8 + 20);
        b.extend_from_slice(&encode_path(i.purpose, i.address_index));
        b.extend_from_slice(&i.prevout);
        b.push(data.script_type.tag());
        b.extend_from_slice(&i.value.to_be_bytes());
        b.extend_from_slice(&hash160(&i.pubkey.serialize()));

        Ok(b)
    }
}
