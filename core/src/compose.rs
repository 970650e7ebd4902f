// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Signed transaction composition
//!
//! Legacy inputs carry `push(sig ‖ sighash) ‖ push(pubkey)` as scriptSig.
//! Segwit transactions are serialised with the BIP144 marker and flag,
//! P2WPKH witness stacks are `[sig ‖ sighash, pubkey]` (with the P2WPKH
//! redeem script as scriptSig for P2SH-wrapped inputs) and taproot key-path
//! witness stacks are `[sig]`.

use log::debug;

use crate::{
    helpers::{write_compact_size, write_push, write_var_bytes},
    prepare::{PreparedData, SIGHASH_ALL},
    script::redeem_script,
    signature::ProcessedSignature,
    Error, ScriptType,
};

/// BIP144 segwit marker and flag
const SEGWIT_MARKER: [u8; 2] = [0x00, 0x01];

/// Compose the signed transaction from prepared data and one processed
/// signature per input (in input order)
pub fn compose(data: &PreparedData, signatures: &[ProcessedSignature]) -> Result<Vec<u8>, Error> {
    if signatures.len() != data.inputs.len() {
        return Err(Error::SignatureCount {
            expected: data.inputs.len(),
            actual: signatures.len(),
        });
    }

    let segwit = data.script_type.is_segwit();

    let mut b = Vec::with_capacity(512);
    b.extend_from_slice(&data.version.to_le_bytes());
    if segwit {
        b.extend_from_slice(&SEGWIT_MARKER);
    }

    // Inputs
    let mut witnesses = Vec::with_capacity(data.inputs.len());

    write_compact_size(&mut b, data.inputs.len());
    for (input, sig) in data.inputs.iter().zip(signatures) {
        b.extend_from_slice(&input.prevout);

        let pubkey = input.pubkey.serialize();

        match (data.script_type, sig) {
            (ScriptType::P2pkh, ProcessedSignature::Ecdsa(s)) => {
                let mut script_sig = vec![];
                write_push(&mut script_sig, &ecdsa_with_sighash(&s.to_der()));
                write_push(&mut script_sig, &pubkey);
                write_var_bytes(&mut b, &script_sig);
            }
            (ScriptType::P2wpkh, ProcessedSignature::Ecdsa(s)) => {
                b.push(0x00);
                witnesses.push(vec![ecdsa_with_sighash(&s.to_der()), pubkey.to_vec()]);
            }
            (ScriptType::P2shP2wpkh, ProcessedSignature::Ecdsa(s)) => {
                let mut script_sig = vec![];
                write_push(&mut script_sig, redeem_script(&input.pubkey).as_bytes());
                write_var_bytes(&mut b, &script_sig);
                witnesses.push(vec![ecdsa_with_sighash(&s.to_der()), pubkey.to_vec()]);
            }
            (ScriptType::P2tr, ProcessedSignature::Schnorr(s)) => {
                b.push(0x00);
                witnesses.push(vec![s.to_vec()]);
            }
            _ => return Err(Error::InvalidSignature),
        }

        b.extend_from_slice(&input.sequence.to_le_bytes());
    }

    // Outputs
    data.write_outputs(&mut b);

    // Witnesses
    for w in &witnesses {
        write_compact_size(&mut b, w.len());
        for item in w {
            write_var_bytes(&mut b, item);
        }
    }

    b.extend_from_slice(&data.locktime.to_le_bytes());

    debug!(
        "composed {} tx: {} inputs, {} bytes",
        data.script_type,
        data.inputs.len(),
        b.len()
    );

    Ok(b)
}

/// Compose the signed transaction, hex encoded
pub fn compose_hex(
    data: &PreparedData,
    signatures: &[ProcessedSignature],
) -> Result<String, Error> {
    compose(data, signatures).map(hex::encode)
}

fn ecdsa_with_sighash(der: &[u8]) -> Vec<u8> {
    let mut s = der.to_vec();
    s.push(SIGHASH_ALL as u8);
    s
}

#[cfg(test)]
mod test {
    use bitcoin::{consensus::deserialize, Transaction};

    use super::*;
    use crate::{prepare::fixtures, signature::CanonicalSignature};

    const DER: &str = "30440220111111111111111111111111111111111111111111111111111111111111111102202222222222222222222222222222222222222222222222222222222222222222";

    fn ecdsa() -> ProcessedSignature {
        ProcessedSignature::Ecdsa(CanonicalSignature::from_der(&hex::decode(DER).unwrap()).unwrap())
    }

    fn schnorr() -> ProcessedSignature {
        let mut s = [0u8; 64];
        s.iter_mut().enumerate().for_each(|(i, v)| *v = i as u8);
        ProcessedSignature::Schnorr(s)
    }

    /// P2TR single input, single output with change
    #[test]
    fn taproot_golden() {
        let p = fixtures::taproot();

        assert_eq!(
            compose_hex(&p, &[schnorr()]).unwrap(),
            "02000000000101675f4e3d2c1b0af9e8d7c6b5a4938271605f4e3d2c1b0a9f7e5d4c6a1e3b2f8d0000000000ffffffff025901000000000000225120418c46636d9e1a683f58e35b42336e776fdcc3b2d4e39e7a0bf1ab0716e3c5fa7f8e000000000000225120a60869f0dbcf1dc659c9cecbaf8050135ea9e8cdc487053f1dc6880949dc684c0140000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f202122232425262728292a2b2c2d2e2f303132333435363738393a3b3c3d3e3f00000000"
        );
    }

    #[test]
    fn legacy_golden() {
        let p = fixtures::legacy();

        let tx = compose(&p, &[ecdsa()]).unwrap();
        assert_eq!(
            hex::encode(&tx),
            "0100000001f1c5e7d24d0a6e0c0b1a4e7b8d9edee1c0c95cbbd3420a5af1e3225df3a6e60b010000006a473044022011111111111111111111111111111111111111111111111111111111111111110220222222222222222222222222222222222222222222222222222222222222222201210279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798ffffffff01905f0100000000001976a91406afd46bcdfd22ef94ac122aa11f241244a37ecc88ac00000000"
        );

        let t: Transaction = deserialize(&tx).unwrap();
        assert_eq!(t.input.len(), 1);
        assert!(t.input[0].witness.is_empty());
    }

    #[test]
    fn p2wpkh_golden() {
        let p = fixtures::segwit(ScriptType::P2wpkh);

        let tx = compose(&p, &[ecdsa()]).unwrap();
        assert_eq!(
            hex::encode(&tx),
            "02000000000101f1c5e7d24d0a6e0c0b1a4e7b8d9edee1c0c95cbbd3420a5af1e3225df3a6e60b0100000000ffffffff02905f01000000000016001406afd46bcdfd22ef94ac122aa11f241244a37ecc8813000000000000160014751e76e8199196d454941c45d1b3a323f1433bd602473044022011111111111111111111111111111111111111111111111111111111111111110220222222222222222222222222222222222222222222222222222222222222222201210279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f8179800000000"
        );

        let t: Transaction = deserialize(&tx).unwrap();
        assert!(t.input[0].script_sig.is_empty());
        assert_eq!(t.input[0].witness.len(), 2);
        assert_eq!(t.output.len(), 2);
    }

    #[test]
    fn p2sh_p2wpkh_golden() {
        let p = fixtures::segwit(ScriptType::P2shP2wpkh);

        let tx = compose(&p, &[ecdsa()]).unwrap();
        assert_eq!(
            hex::encode(&tx),
            "02000000000101f1c5e7d24d0a6e0c0b1a4e7b8d9edee1c0c95cbbd3420a5af1e3225df3a6e60b0100000017160014751e76e8199196d454941c45d1b3a323f1433bd6ffffffff02905f01000000000016001406afd46bcdfd22ef94ac122aa11f241244a37ecc881300000000000017a914bcfeb728b584253d5f3f70bcb780e9ef218a68f48702473044022011111111111111111111111111111111111111111111111111111111111111110220222222222222222222222222222222222222222222222222222222222222222201210279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f8179800000000"
        );

        let t: Transaction = deserialize(&tx).unwrap();
        assert!(!t.input[0].script_sig.is_empty());
        assert_eq!(t.input[0].witness.len(), 2);
    }

    #[test]
    fn signature_mismatches() {
        let p = fixtures::legacy();

        assert_eq!(
            compose(&p, &[]),
            Err(Error::SignatureCount {
                expected: 1,
                actual: 0
            })
        );
        assert_eq!(compose(&p, &[schnorr()]), Err(Error::InvalidSignature));

        let p = fixtures::taproot();
        assert_eq!(compose(&p, &[ecdsa()]), Err(Error::InvalidSignature));
    }
}
