// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device argument encoding
//!
//! The secure element reconstructs (and displays) the transaction from a
//! global argument followed by one argument per input. The byte layout
//! differs by firmware generation and input script family, each captured by
//! an [ArgumentEncodingStrategy].
//!
//! All strategies share the output block:
//!
//! ```text
//! +----------+------------+-----------+-------------+-------------+---------------+-------------+
//! | OUT_TYPE | OUT_AMOUNT | OUT_HASH  | HAVE_CHANGE | CHANGE_TYPE | CHANGE_AMOUNT | CHANGE_PATH |
//! | 1        | 8 (BE)     | 32        | 1           | 1           | 8 (BE)        | 22          |
//! +----------+------------+-----------+-------------+-------------+---------------+-------------+
//! ```
//!
//! followed by `EXT_LEN(1) ‖ EXT_SCRIPT` where an extension output is present.

use strum::{Display, EnumString};

use crate::{prepare::PreparedData, types::DEFAULT_SEQUENCE, Error, ScriptType};

mod legacy;
pub use legacy::Legacy;

mod segwit;
pub use segwit::SegwitV0;

mod taproot;
pub use taproot::Taproot;

/// First SE version supporting segwit arguments
pub const SEGWIT_MIN_SE_VERSION: u32 = 300;

/// First SE version supporting taproot arguments
pub const TAPROOT_MIN_SE_VERSION: u32 = 331;

/// Derivation path length prefix
pub const PATH_PREFIX: u8 = 0x15;

/// Derivation path type (BIP32)
pub const PATH_TYPE_BIP32: u8 = 0x32;

/// Encoded derivation path length
pub const PATH_LEN: usize = 22;

/// Output block length (without extension)
pub const OUTPUT_BLOCK_LEN: usize = 73;

const HARDENED: u32 = 0x8000_0000;

/// Device firmware generation, determining available argument formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[strum(serialize_all = "lowercase")]
pub enum FirmwareGeneration {
    Legacy,
    Segwit,
    Taproot,
}

impl FirmwareGeneration {
    /// Resolve the firmware generation from a reported SE version
    pub fn from_se_version(version: u32) -> Self {
        match version {
            v if v >= TAPROOT_MIN_SE_VERSION => FirmwareGeneration::Taproot,
            v if v >= SEGWIT_MIN_SE_VERSION => FirmwareGeneration::Segwit,
            _ => FirmwareGeneration::Legacy,
        }
    }
}

/// Argument family, also selects the device script to execute
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum ArgumentFamily {
    Legacy,
    SegwitV0,
    Taproot,
}

/// Argument encoding strategy for a (firmware generation, script family) pair
pub trait ArgumentEncodingStrategy: Send + Sync {
    /// Argument family implemented by this strategy
    fn family(&self) -> ArgumentFamily;

    /// Encode the transaction-level argument
    fn encode_global(&self, data: &PreparedData) -> Result<Vec<u8>, Error>;

    /// Encode the per-input argument for the input at `index`
    fn encode_input(&self, data: &PreparedData, index: usize) -> Result<Vec<u8>, Error>;

    /// Encode per-input arguments for all inputs, in input order
    fn encode_inputs(&self, data: &PreparedData) -> Result<Vec<Vec<u8>>, Error> {
        (0..data.inputs.len())
            .map(|i| self.encode_input(data, i))
            .collect()
    }
}

/// Select an argument encoding strategy for the firmware generation and
/// input script type
pub fn select(
    generation: FirmwareGeneration,
    script_type: ScriptType,
) -> Result<&'static dyn ArgumentEncodingStrategy, Error> {
    use FirmwareGeneration as G;
    use ScriptType as S;

    let s: &'static dyn ArgumentEncodingStrategy = match (generation, script_type) {
        (_, S::P2pkh) => &Legacy,
        (G::Legacy, S::P2shP2wpkh | S::P2wpkh) => &Legacy,
        (_, S::P2shP2wpkh | S::P2wpkh) => &SegwitV0,
        (G::Taproot, S::P2tr) => &Taproot,
        (_, S::P2tr) => return Err(Error::UnsupportedFirmware(generation, script_type)),
        (_, S::P2wsh) => {
            return Err(Error::UnsupportedScriptType(
                "P2WSH inputs are not supported".to_string(),
            ))
        }
    };

    Ok(s)
}

/// Encode a derivation path `purpose' / 0' / 0' / 0 / index`
pub fn encode_path(purpose: u32, index: u32) -> [u8; PATH_LEN] {
    let mut b = [0u8; PATH_LEN];
    b[0] = PATH_PREFIX;
    b[1] = PATH_TYPE_BIP32;

    let elements = [purpose | HARDENED, HARDENED, HARDENED, 0, index];
    for (i, e) in elements.iter().enumerate() {
        b[2 + i * 4..][..4].copy_from_slice(&e.to_be_bytes());
    }

    b
}

/// Check every input carries the final sequence `0xffffffff`.
///
/// Legacy and segwit v0 arguments do not carry per-input sequences, the
/// device signs assuming final sequences.
pub fn check_final_sequences(data: &PreparedData, family: ArgumentFamily) -> Result<(), Error> {
    match data.inputs.iter().position(|i| i.sequence != DEFAULT_SEQUENCE) {
        Some(index) => Err(Error::UnsupportedSequence {
            index,
            sequence: data.inputs[index].sequence,
            family,
        }),
        None => Ok(()),
    }
}

/// Encode the shared output / change block, with extension where present
pub fn encode_output_block(data: &PreparedData) -> Vec<u8> {
    let mut b = Vec::with_capacity(OUTPUT_BLOCK_LEN + 32);

    b.push(data.output.script.script_type.tag());
    b.extend_from_slice(&data.output.value.to_be_bytes());
    b.extend_from_slice(&data.output.script.padded_hash());

    match &data.change {
        Some(c) => {
            b.push(0x01);
            b.push(data.script_type.tag());
            b.extend_from_slice(&c.value.to_be_bytes());
            b.extend_from_slice(&encode_path(c.purpose, c.address_index));
        }
        None => b.extend_from_slice(&[0u8; 1 + 1 + 8 + PATH_LEN]),
    }

    if let Some(e) = &data.extension {
        b.push(e.len() as u8);
        b.extend_from_slice(e.as_bytes());
    }

    b
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prepare::fixtures;

    #[test]
    fn firmware_generations() {
        let tests = &[
            (0, FirmwareGeneration::Legacy),
            (299, FirmwareGeneration::Legacy),
            (300, FirmwareGeneration::Segwit),
            (330, FirmwareGeneration::Segwit),
            (331, FirmwareGeneration::Taproot),
            (400, FirmwareGeneration::Taproot),
        ];

        for (v, g) in tests {
            assert_eq!(FirmwareGeneration::from_se_version(*v), *g, "version {v}");
        }
    }

    #[test]
    fn strategy_selection() {
        use ArgumentFamily as F;
        use FirmwareGeneration as G;
        use ScriptType as S;

        let tests = &[
            (G::Legacy, S::P2pkh, F::Legacy),
            (G::Segwit, S::P2pkh, F::Legacy),
            (G::Taproot, S::P2pkh, F::Legacy),
            (G::Legacy, S::P2wpkh, F::Legacy),
            (G::Legacy, S::P2shP2wpkh, F::Legacy),
            (G::Segwit, S::P2wpkh, F::SegwitV0),
            (G::Segwit, S::P2shP2wpkh, F::SegwitV0),
            (G::Taproot, S::P2wpkh, F::SegwitV0),
            (G::Taproot, S::P2tr, F::Taproot),
        ];

        for (g, s, f) in tests {
            assert_eq!(select(*g, *s).unwrap().family(), *f, "{g} / {s}");
        }

        assert_eq!(
            select(G::Segwit, S::P2tr).err(),
            Some(Error::UnsupportedFirmware(G::Segwit, S::P2tr))
        );
        assert!(matches!(
            select(G::Taproot, S::P2wsh),
            Err(Error::UnsupportedScriptType(_))
        ));
    }

    #[test]
    fn path_encoding() {
        assert_eq!(
            hex::encode(encode_path(44, 0)),
            "15328000002c80000000800000000000000000000000"
        );
        assert_eq!(
            hex::encode(encode_path(86, 7)),
            "15328000005680000000800000000000000000000007"
        );
    }

    #[test]
    fn output_block_without_change() {
        let p = fixtures::legacy();
        let b = encode_output_block(&p);

        assert_eq!(b.len(), OUTPUT_BLOCK_LEN);
        assert_eq!(
            hex::encode(&b[..41]),
            "000000000000015f9000000000000000000000000006afd46bcdfd22ef94ac122aa11f241244a37ecc"
        );
        assert_eq!(&b[41..], &[0u8; 32]);
    }

    #[test]
    fn non_final_sequences_rejected() {
        let tests = &[
            (FirmwareGeneration::Legacy, ScriptType::P2pkh, ArgumentFamily::Legacy),
            (FirmwareGeneration::Legacy, ScriptType::P2wpkh, ArgumentFamily::Legacy),
            (FirmwareGeneration::Segwit, ScriptType::P2wpkh, ArgumentFamily::SegwitV0),
            (FirmwareGeneration::Taproot, ScriptType::P2shP2wpkh, ArgumentFamily::SegwitV0),
        ];

        for (g, s, f) in tests {
            let mut p = match s {
                ScriptType::P2pkh => fixtures::legacy(),
                _ => fixtures::segwit(*s),
            };
            let strategy = select(*g, *s).unwrap();
            assert!(strategy.encode_global(&p).is_ok());

            // Replace-by-fee signalling sequence
            p.inputs[0].sequence = 0xffff_fffd;

            let e = Error::UnsupportedSequence {
                index: 0,
                sequence: 0xffff_fffd,
                family: *f,
            };
            assert_eq!(strategy.encode_global(&p), Err(e.clone()), "{g} / {s}");
            assert_eq!(strategy.encode_input(&p, 0), Err(e), "{g} / {s}");
        }
    }

    #[test]
    fn taproot_sequences_carried() {
        let mut p = fixtures::taproot();
        p.inputs[0].sequence = 0xffff_fffd;

        assert!(Taproot.encode_global(&p).is_ok());
        assert!(Taproot.encode_input(&p, 0).is_ok());
    }
}
