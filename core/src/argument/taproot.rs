// Copyright (c) 2022-2023 The MobileCoin Foundation

use super::{encode_output_block, encode_path, ArgumentEncodingStrategy, ArgumentFamily};
use crate::{prepare::PreparedData, Error};

/// Segwit v1 / taproot (BIP341) argument encoding
///
/// Global: `version (LE) ‖ locktime (LE) ‖ output block ‖ sha_prevouts ‖
/// sha_amounts ‖ sha_scriptpubkeys ‖ sha_sequences` (single SHA-256).
///
/// Per input: `path ‖ input index (LE)`, the device recomputes everything
/// else from the global argument.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Taproot;

impl ArgumentEncodingStrategy for Taproot {
    fn family(&self) -> ArgumentFamily {
        ArgumentFamily::Taproot
    }

    fn encode_global(&self, data: &PreparedData) -> Result<Vec<u8>, Error> {
        let h = &data.taproot_hashes;

        let mut b = Vec::with_capacity(4 + 4 + 73 + 4 * 32);
        b.extend_from_slice(&data.version.to_le_bytes());
        b.extend_from_slice(&data.locktime.to_le_bytes());
        b.extend_from_slice(&encode_output_block(data));
        b.extend_from_slice(&h.prevouts);
        b.extend_from_slice(&h.amounts);
        b.extend_from_slice(&h.script_pubkeys);
        b.extend_from_slice(&h.sequences);

        Ok(b)
    }

    fn encode_input(&self, data: &PreparedData, index: usize) -> Result<Vec<u8>, Error> {
        let i = data.input(index)?;

        let mut b = Vec::with_capacity(22 + 4);
        b.extend_from_slice(&encode_path(i.purpose, i.address_index));
        b.extend_from_slice(&(index as u32).to_le_bytes());

        Ok(b)
    }
}
