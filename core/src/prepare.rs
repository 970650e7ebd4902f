// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Unsigned transaction construction
//!
//! [UnsignedTxBuilder] resolves inputs, outputs and change into an immutable
//! [PreparedData] snapshot. Device arguments, local sighashes and the final
//! signed transaction are all derived from this snapshot, so it is built
//! once per signing session and never recomputed.

use bitcoin::{hashes::Hash, secp256k1::PublicKey, Network, ScriptBuf};
use log::debug;

use crate::{
    helpers::{sha256, sha256d, write_compact_size, write_push, write_var_bytes},
    script::{address_to_script, pubkey_to_script, OutputScript},
    types::{Change, Input, Output},
    Error, ScriptType,
};

/// Maximum amount in satoshis
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// Maximum extension output data length
pub const MAX_EXTENSION_LEN: usize = 80;

/// Default transaction version
pub const DEFAULT_VERSION: u32 = 2;

/// SIGHASH_ALL, appended to legacy preimages and ECDSA signatures
pub const SIGHASH_ALL: u32 = 0x01;

/// Parse a decimal satoshi amount
pub fn parse_amount(v: &str) -> Result<u64, Error> {
    let a = v
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::InvalidAmount(v.to_string()))?;

    if a > MAX_MONEY {
        return Err(Error::InvalidAmount(v.to_string()));
    }

    Ok(a)
}

/// Prepared transaction input
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedInput {
    pub address_index: u32,
    pub purpose: u32,
    pub pubkey: PublicKey,
    /// Serialized outpoint (txid in internal order ‖ index LE)
    pub prevout: [u8; 36],
    pub value: u64,
    pub sequence: u32,
    /// Input scriptPubKey
    pub script: OutputScript,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreparedOutput {
    pub value: u64,
    pub script: OutputScript,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreparedChange {
    pub address_index: u32,
    pub purpose: u32,
    pub pubkey: PublicKey,
    pub value: u64,
    pub script: OutputScript,
}

/// BIP143 aggregate hashes (double SHA-256)
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateHashes {
    pub prevouts: [u8; 32],
    pub sequences: [u8; 32],
    pub outputs: [u8; 32],
}

/// BIP341 aggregate hashes (single SHA-256)
#[derive(Clone, Debug, PartialEq)]
pub struct TaprootHashes {
    pub prevouts: [u8; 32],
    pub amounts: [u8; 32],
    pub script_pubkeys: [u8; 32],
    pub sequences: [u8; 32],
    pub outputs: [u8; 32],
}

/// Immutable per-session transaction snapshot
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedData {
    pub version: u32,
    pub locktime: u32,
    /// Script type shared by all inputs (and change)
    pub script_type: ScriptType,
    pub inputs: Vec<PreparedInput>,
    pub output: PreparedOutput,
    /// OP_RETURN extension output script
    pub extension: Option<ScriptBuf>,
    pub change: Option<PreparedChange>,
    pub output_count: usize,
    /// Serialized outputs, without count prefix
    pub outputs: Vec<u8>,
    pub segwit_hashes: AggregateHashes,
    pub taproot_hashes: TaprootHashes,
}

impl PreparedData {
    /// Fetch a prepared input by index
    pub fn input(&self, index: usize) -> Result<&PreparedInput, Error> {
        self.inputs.get(index).ok_or(Error::InputIndex(index))
    }

    /// Write count-prefixed outputs
    pub fn write_outputs(&self, buff: &mut Vec<u8>) {
        write_compact_size(buff, self.output_count);
        buff.extend_from_slice(&self.outputs);
    }

    /// Build the legacy unsigned transaction for an input, with the input
    /// script replaced by its scriptCode, sibling scripts emptied, and the
    /// SIGHASH_ALL type appended.
    pub fn unsigned_legacy(&self, index: usize) -> Result<Vec<u8>, Error> {
        let _ = self.input(index)?;

        let mut b = Vec::with_capacity(256);
        b.extend_from_slice(&self.version.to_le_bytes());

        write_compact_size(&mut b, self.inputs.len());
        for (i, input) in self.inputs.iter().enumerate() {
            b.extend_from_slice(&input.prevout);
            match i == index {
                true => write_var_bytes(&mut b, input.script.script.as_bytes()),
                false => b.push(0x00),
            }
            b.extend_from_slice(&input.sequence.to_le_bytes());
        }

        self.write_outputs(&mut b);
        b.extend_from_slice(&self.locktime.to_le_bytes());
        b.extend_from_slice(&SIGHASH_ALL.to_le_bytes());

        Ok(b)
    }
}

/// Builder for [PreparedData]
#[derive(Clone, Debug)]
pub struct UnsignedTxBuilder {
    network: Network,
    script_type: ScriptType,
    version: u32,
    locktime: u32,
    inputs: Vec<Input>,
    output: Option<Output>,
    extension: Option<Vec<u8>>,
    change: Option<Change>,
}

impl UnsignedTxBuilder {
    /// Create a new builder for inputs of the provided script type
    pub fn new(script_type: ScriptType, network: Network) -> Self {
        Self {
            network,
            script_type,
            version: DEFAULT_VERSION,
            locktime: 0,
            inputs: vec![],
            output: None,
            extension: None,
            change: None,
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn locktime(mut self, locktime: u32) -> Self {
        self.locktime = locktime;
        self
    }

    pub fn input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn inputs(mut self, inputs: impl IntoIterator<Item = Input>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn output(mut self, output: Output) -> Self {
        self.output = Some(output);
        self
    }

    /// Attach an OP_RETURN extension output carrying the provided data
    pub fn extension(mut self, data: &[u8]) -> Self {
        self.extension = Some(data.to_vec());
        self
    }

    pub fn change(mut self, change: Option<Change>) -> Self {
        self.change = change;
        self
    }

    /// Resolve and serialize the transaction
    pub fn build(self) -> Result<PreparedData, Error> {
        if self.script_type == ScriptType::P2wsh {
            return Err(Error::UnsupportedScriptType(
                "P2WSH inputs are not supported".to_string(),
            ));
        }

        if self.inputs.is_empty() {
            return Err(Error::NoInputs);
        }

        // Resolve inputs
        let mut inputs = Vec::with_capacity(self.inputs.len());
        for (i, input) in self.inputs.iter().enumerate() {
            let pubkey = input.pubkey.ok_or(Error::MissingInputKey(i))?;

            let mut prevout = [0u8; 36];
            prevout[..32].copy_from_slice(&input.prev_tx_hash.to_byte_array());
            prevout[32..].copy_from_slice(&input.prev_index.to_le_bytes());

            inputs.push(PreparedInput {
                address_index: input.address_index,
                purpose: input
                    .purpose
                    .unwrap_or_else(|| self.script_type.default_purpose()),
                pubkey,
                prevout,
                value: parse_amount(&input.prev_value)?,
                sequence: input.sequence,
                script: pubkey_to_script(&pubkey, self.script_type)?,
            });
        }

        // Resolve primary output
        let o = self.output.as_ref().ok_or(Error::NoOutput)?;
        let output = PreparedOutput {
            value: parse_amount(&o.value)?,
            script: address_to_script(&o.address, self.network)?,
        };

        // Build extension script
        let extension = match &self.extension {
            Some(d) if d.len() > MAX_EXTENSION_LEN => {
                return Err(Error::ExtensionTooLarge(d.len()))
            }
            Some(d) => {
                let mut s = vec![0x6a];
                write_push(&mut s, d);
                Some(ScriptBuf::from_bytes(s))
            }
            None => None,
        };

        // Resolve change, sharing the input script family
        let change = match &self.change {
            Some(c) => {
                let pubkey = c.pubkey.ok_or(Error::MissingChangeKey)?;
                Some(PreparedChange {
                    address_index: c.address_index,
                    purpose: c
                        .purpose
                        .unwrap_or_else(|| self.script_type.default_purpose()),
                    pubkey,
                    value: parse_amount(&c.value)?,
                    script: pubkey_to_script(&pubkey, self.script_type)?,
                })
            }
            None => None,
        };

        // Check values balance
        let total_in: u64 = inputs.iter().map(|i| i.value).sum();
        let total_out = output.value + change.as_ref().map(|c| c.value).unwrap_or(0);
        if total_out > total_in {
            return Err(Error::InvalidAmount(format!(
                "outputs ({total_out}) exceed inputs ({total_in})"
            )));
        }

        // Serialize outputs: primary, extension, change
        let mut outputs = vec![];
        let mut output_count = 1;

        outputs.extend_from_slice(&output.value.to_le_bytes());
        write_var_bytes(&mut outputs, output.script.script.as_bytes());

        if let Some(e) = &extension {
            outputs.extend_from_slice(&0u64.to_le_bytes());
            write_var_bytes(&mut outputs, e.as_bytes());
            output_count += 1;
        }

        if let Some(c) = &change {
            outputs.extend_from_slice(&c.value.to_le_bytes());
            write_var_bytes(&mut outputs, c.script.script.as_bytes());
            output_count += 1;
        }

        // Compute aggregate hashes
        let prevouts: Vec<u8> = inputs.iter().flat_map(|i| i.prevout).collect();
        let sequences: Vec<u8> = inputs
            .iter()
            .flat_map(|i| i.sequence.to_le_bytes())
            .collect();
        let amounts: Vec<u8> = inputs.iter().flat_map(|i| i.value.to_le_bytes()).collect();
        let mut script_pubkeys = vec![];
        for i in &inputs {
            write_var_bytes(&mut script_pubkeys, i.script.script.as_bytes());
        }

        let segwit_hashes = AggregateHashes {
            prevouts: sha256d(&prevouts),
            sequences: sha256d(&sequences),
            outputs: sha256d(&outputs),
        };

        let taproot_hashes = TaprootHashes {
            prevouts: sha256(&prevouts),
            amounts: sha256(&amounts),
            script_pubkeys: sha256(&script_pubkeys),
            sequences: sha256(&sequences),
            outputs: sha256(&outputs),
        };

        debug!(
            "prepared {} tx: {} inputs, {} outputs ({} in, {} out)",
            self.script_type,
            inputs.len(),
            output_count,
            total_in,
            total_out
        );

        Ok(PreparedData {
            version: self.version,
            locktime: self.locktime,
            script_type: self.script_type,
            inputs,
            output,
            extension,
            change,
            output_count,
            outputs,
            segwit_hashes,
            taproot_hashes,
        })
    }
}


#[cfg(test)]
mod test {
    use std::str::FromStr;

    use bitcoin::Txid;

    use super::{fixtures::*, *};

    #[test]
    fn legacy_unsigned() {
        let p = legacy();

        assert_eq!(
            hex::encode(p.unsigned_legacy(0).unwrap()),
            "0100000001f1c5e7d24d0a6e0c0b1a4e7b8d9edee1c0c95cbbd3420a5af1e3225df3a6e60b010000001976a914751e76e8199196d454941c45d1b3a323f1433bd688acffffffff01905f0100000000001976a91406afd46bcdfd22ef94ac122aa11f241244a37ecc88ac0000000001000000"
        );

        assert_eq!(p.unsigned_legacy(1), Err(Error::InputIndex(1)));
    }

    #[test]
    fn legacy_scriptcode_substitution() {
        let tx = Txid::from_str("0be6a6f35d22e3f15a0a42d3bb5cc9c0e1de9e8d7b4e1a0b0c6e0a4dd2e7c5f1")
            .unwrap();

        let inputs = (0..2).map(|n| {
            let mut i = Input::new(tx, n, "50000", n);
            i.pubkey = Some(key(G));
            i
        });

        let p = UnsignedTxBuilder::new(ScriptType::P2pkh, Network::Bitcoin)
            .inputs(inputs)
            .output(Output::new("1cMh228HTCiwS8ZsaakH8A8wze1JR5ZsP", "90000"))
            .build()
            .unwrap();

        let spk = p.inputs[0].script.script.as_bytes().to_vec();

        // Input 0 carries its scriptCode, input 1 an empty script
        let u0 = p.unsigned_legacy(0).unwrap();
        let i0 = 4 + 1 + 36;
        assert_eq!(u0[i0] as usize, spk.len());
        assert_eq!(&u0[i0 + 1..][..spk.len()], &spk[..]);
        let i1 = i0 + 1 + spk.len() + 4 + 36;
        assert_eq!(u0[i1], 0x00);

        // and vice versa
        let u1 = p.unsigned_legacy(1).unwrap();
        assert_eq!(u1[i0], 0x00);
        assert_eq!(u1[i0 + 1 + 4 + 36] as usize, spk.len());
    }

    #[test]
    fn output_ordering() {
        let mut i = Input::new(
            Txid::from_str("0be6a6f35d22e3f15a0a42d3bb5cc9c0e1de9e8d7b4e1a0b0c6e0a4dd2e7c5f1")
                .unwrap(),
            0,
            "100000",
            0,
        );
        i.pubkey = Some(key(G));

        let mut c = Change::new(1, "1000");
        c.pubkey = Some(key(G));

        let p = UnsignedTxBuilder::new(ScriptType::P2wpkh, Network::Bitcoin)
            .input(i)
            .output(Output::new("1cMh228HTCiwS8ZsaakH8A8wze1JR5ZsP", "90000"))
            .extension(b"omni")
            .change(Some(c))
            .build()
            .unwrap();

        assert_eq!(p.output_count, 3);

        let mut b = vec![];
        p.write_outputs(&mut b);

        // Primary (P2PKH, 25 byte script)
        assert_eq!(b[0], 3);
        assert_eq!(&b[1..9], &90000u64.to_le_bytes());
        assert_eq!(b[9], 25);

        // Extension, zero valued OP_RETURN
        let e = 10 + 25;
        assert_eq!(&b[e..][..8], &[0u8; 8]);
        assert_eq!(&b[e + 8..][..7], &[0x06, 0x6a, 0x04, b'o', b'm', b'n', b'i']);

        // Change uses the input (P2WPKH) script family
        let c = e + 8 + 7;
        assert_eq!(&b[c..][..8], &1000u64.to_le_bytes());
        assert_eq!(&b[c + 8..][..3], &[0x16, 0x00, 0x14]);
        assert_eq!(p.change.unwrap().script.script_type, ScriptType::P2wpkh);
    }

    #[test]
    fn resolution_errors() {
        let tx = Txid::from_str("0be6a6f35d22e3f15a0a42d3bb5cc9c0e1de9e8d7b4e1a0b0c6e0a4dd2e7c5f1")
            .unwrap();
        let o = Output::new("1cMh228HTCiwS8ZsaakH8A8wze1JR5ZsP", "1000");

        // Missing input key
        let r = UnsignedTxBuilder::new(ScriptType::P2pkh, Network::Bitcoin)
            .input(Input::new(tx, 0, "5000", 0))
            .output(o.clone())
            .build();
        assert_eq!(r, Err(Error::MissingInputKey(0)));

        let mut i = Input::new(tx, 0, "5000", 0);
        i.pubkey = Some(key(G));

        // Missing change key
        let r = UnsignedTxBuilder::new(ScriptType::P2pkh, Network::Bitcoin)
            .input(i.clone())
            .output(o.clone())
            .change(Some(Change::new(0, "100")))
            .build();
        assert_eq!(r, Err(Error::MissingChangeKey));

        // No inputs
        let r = UnsignedTxBuilder::new(ScriptType::P2pkh, Network::Bitcoin)
            .output(o.clone())
            .build();
        assert_eq!(r, Err(Error::NoInputs));

        // P2WSH inputs
        let r = UnsignedTxBuilder::new(ScriptType::P2wsh, Network::Bitcoin)
            .input(i.clone())
            .output(o.clone())
            .build();
        assert!(matches!(r, Err(Error::UnsupportedScriptType(_))));

        // Overspend
        let r = UnsignedTxBuilder::new(ScriptType::P2pkh, Network::Bitcoin)
            .input(i.clone())
            .output(Output::new("1cMh228HTCiwS8ZsaakH8A8wze1JR5ZsP", "6000"))
            .build();
        assert!(matches!(r, Err(Error::InvalidAmount(_))));

        // Oversized extension
        let r = UnsignedTxBuilder::new(ScriptType::P2pkh, Network::Bitcoin)
            .input(i)
            .output(o)
            .extension(&[0u8; 81])
            .build();
        assert_eq!(r, Err(Error::ExtensionTooLarge(81)));
    }

    #[test]
    fn amounts() {
        assert_eq!(parse_amount("37440"), Ok(37440));
        assert_eq!(parse_amount(" 345 "), Ok(345));
        assert!(parse_amount("1.5").is_err());
        assert!(parse_amount("-1").is_err());
        assert!(parse_amount("2100000000000001").is_err());
    }
}
