// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Local sighash computation and signature verification
//!
//! Digests are computed from the same [PreparedData] used to build device
//! arguments, allowing returned signatures to be checked before a
//! transaction is composed.

use bitcoin::secp256k1::{schnorr, Message, Secp256k1};
use log::trace;

use crate::{
    helpers::{hash160, sha256d},
    prepare::{PreparedData, SIGHASH_ALL},
    signature::ProcessedSignature,
    tweak::{tagged_hash, tweak, TAG_TAP_SIGHASH},
    Error, ScriptType,
};

/// BIP341 SIGHASH_DEFAULT
pub const SIGHASH_DEFAULT: u8 = 0x00;

/// Compute the sighash for an input, by input script type
pub fn sighash(data: &PreparedData, index: usize) -> Result<[u8; 32], Error> {
    match data.script_type {
        ScriptType::P2pkh => legacy(data, index),
        ScriptType::P2wpkh | ScriptType::P2shP2wpkh => segwit_v0(data, index),
        ScriptType::P2tr => taproot(data, index),
        ScriptType::P2wsh => Err(Error::UnsupportedScriptType(
            "P2WSH inputs are not supported".to_string(),
        )),
    }
}

/// Legacy sighash, over the scriptCode substituted unsigned transaction
pub fn legacy(data: &PreparedData, index: usize) -> Result<[u8; 32], Error> {
    let tx = data.unsigned_legacy(index)?;
    Ok(sha256d(&tx))
}

/// BIP143 sighash (SIGHASH_ALL)
pub fn segwit_v0(data: &PreparedData, index: usize) -> Result<[u8; 32], Error> {
    let i = data.input(index)?;
    let h = &data.segwit_hashes;

    let pkh = hash160(&i.pubkey.serialize());

    let mut b = Vec::with_capacity(4 + 32 + 32 + 36 + 26 + 8 + 4 + 32 + 4 + 4);
    b.extend_from_slice(&data.version.to_le_bytes());
    b.extend_from_slice(&h.prevouts);
    b.extend_from_slice(&h.sequences);
    b.extend_from_slice(&i.prevout);

    // scriptCode for P2WPKH is the equivalent P2PKH script
    b.extend_from_slice(&[0x19, 0x76, 0xa9, 0x14]);
    b.extend_from_slice(&pkh);
    b.extend_from_slice(&[0x88, 0xac]);

    b.extend_from_slice(&i.value.to_le_bytes());
    b.extend_from_slice(&i.sequence.to_le_bytes());
    b.extend_from_slice(&h.outputs);
    b.extend_from_slice(&data.locktime.to_le_bytes());
    b.extend_from_slice(&SIGHASH_ALL.to_le_bytes());

    Ok(sha256d(&b))
}

/// BIP341 key-path sighash (SIGHASH_DEFAULT, no annex)
pub fn taproot(data: &PreparedData, index: usize) -> Result<[u8; 32], Error> {
    let _ = data.input(index)?;
    let h = &data.taproot_hashes;

    let epoch = [0x00];
    let hash_type = [SIGHASH_DEFAULT];
    let spend_type = [0x00];

    Ok(tagged_hash(
        &TAG_TAP_SIGHASH,
        &[
            &epoch,
            &hash_type,
            &data.version.to_le_bytes(),
            &data.locktime.to_le_bytes(),
            &h.prevouts,
            &h.amounts,
            &h.script_pubkeys,
            &h.sequences,
            &h.outputs,
            &spend_type,
            &(index as u32).to_le_bytes(),
        ],
    ))
}

/// Verify a processed signature against the locally computed sighash for
/// an input, using the tweaked output key for taproot inputs
pub fn verify(data: &PreparedData, index: usize, sig: &ProcessedSignature) -> Result<bool, Error> {
    let i = data.input(index)?;
    let digest = sighash(data, index)?;
    let msg = Message::from_digest(digest);

    let secp = Secp256k1::verification_only();

    let ok = match sig {
        ProcessedSignature::Ecdsa(s) if !data.script_type.is_taproot() => {
            secp.verify_ecdsa(&msg, s.as_ecdsa(), &i.pubkey).is_ok()
        }
        ProcessedSignature::Schnorr(s) if data.script_type.is_taproot() => {
            let s = schnorr::Signature::from_slice(s).map_err(|_| Error::InvalidSignature)?;
            let k = tweak(&i.pubkey.serialize())?;
            secp.verify_schnorr(&s, &msg, &k).is_ok()
        }
        _ => return Err(Error::InvalidSignature),
    };

    trace!("input {index} sighash {} verified: {ok}", hex::encode(digest));

    Ok(ok)
}
