// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Script type resolution
//!
//! Maps addresses to output scripts (and hashes) and public keys to
//! addresses, for each supported [ScriptType].

use std::str::FromStr;

use bitcoin::{address::ParseError, secp256k1::PublicKey, Address, Network, ScriptBuf};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumIter, EnumString};

use crate::{helpers::hash160, tweak::tweak, Error};

/// Script type, determines address format, device script variant, and
/// sighash algorithm family.
///
/// Discriminants are the tags used in device arguments.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    TryFromPrimitive,
    IntoPrimitive,
    Display,
    EnumString,
    EnumIter,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[strum(ascii_case_insensitive)]
pub enum ScriptType {
    #[strum(serialize = "P2PKH")]
    #[cfg_attr(feature = "serde", serde(rename = "P2PKH"))]
    P2pkh = 0,

    #[strum(serialize = "P2SH-P2WPKH")]
    #[cfg_attr(feature = "serde", serde(rename = "P2SH-P2WPKH"))]
    P2shP2wpkh = 1,

    #[strum(serialize = "P2WPKH")]
    #[cfg_attr(feature = "serde", serde(rename = "P2WPKH"))]
    P2wpkh = 2,

    #[strum(serialize = "P2WSH")]
    #[cfg_attr(feature = "serde", serde(rename = "P2WSH"))]
    P2wsh = 3,

    #[strum(serialize = "P2TR")]
    #[cfg_attr(feature = "serde", serde(rename = "P2TR"))]
    P2tr = 4,
}

impl ScriptType {
    /// Device argument tag
    pub fn tag(&self) -> u8 {
        (*self).into()
    }

    /// Default BIP44-style purpose for keys of this script type
    pub fn default_purpose(&self) -> u32 {
        match self {
            ScriptType::P2pkh => 44,
            ScriptType::P2shP2wpkh => 49,
            ScriptType::P2wpkh => 84,
            ScriptType::P2wsh => 48,
            ScriptType::P2tr => 86,
        }
    }

    /// Check whether spends of this type carry witness data
    pub fn is_segwit(&self) -> bool {
        !matches!(self, ScriptType::P2pkh)
    }

    /// Check whether spends of this type use schnorr signatures
    pub fn is_taproot(&self) -> bool {
        matches!(self, ScriptType::P2tr)
    }
}

/// Resolved output script with its embedded hash / key
#[derive(Clone, Debug, PartialEq)]
pub struct OutputScript {
    pub script_type: ScriptType,
    pub script: ScriptBuf,
    /// Pubkey or script hash (20 bytes), witness program or x-only key (32 bytes)
    pub hash: Vec<u8>,
}

impl OutputScript {
    /// Hash left-padded with zeros to 32 bytes
    pub fn padded_hash(&self) -> [u8; 32] {
        let mut b = [0u8; 32];
        b[32 - self.hash.len()..].copy_from_slice(&self.hash);
        b
    }

    /// Classify a raw scriptPubKey
    pub fn from_script(script: &[u8]) -> Result<Self, Error> {
        let (script_type, hash) = match script {
            [0x76, 0xa9, 0x14, h @ .., 0x88, 0xac] if h.len() == 20 => (ScriptType::P2pkh, h),
            [0xa9, 0x14, h @ .., 0x87] if h.len() == 20 => (ScriptType::P2shP2wpkh, h),
            [0x00, 0x14, h @ ..] if h.len() == 20 => (ScriptType::P2wpkh, h),
            [0x00, 0x20, h @ ..] if h.len() == 32 => (ScriptType::P2wsh, h),
            [0x51, 0x20, h @ ..] if h.len() == 32 => (ScriptType::P2tr, h),
            _ => {
                return Err(Error::UnsupportedScriptType(format!(
                    "script {}",
                    hex::encode(script)
                )))
            }
        };

        Ok(Self {
            script_type,
            script: ScriptBuf::from_bytes(script.to_vec()),
            hash: hash.to_vec(),
        })
    }
}

pub fn p2pkh_script(h: &[u8; 20]) -> ScriptBuf {
    ScriptBuf::from_bytes([&[0x76, 0xa9, 0x14][..], &h[..], &[0x88, 0xac]].concat())
}

pub fn p2sh_script(h: &[u8; 20]) -> ScriptBuf {
    ScriptBuf::from_bytes([&[0xa9, 0x14][..], &h[..], &[0x87]].concat())
}

pub fn p2wpkh_script(h: &[u8; 20]) -> ScriptBuf {
    ScriptBuf::from_bytes([&[0x00, 0x14][..], &h[..]].concat())
}

pub fn p2tr_script(x: &[u8; 32]) -> ScriptBuf {
    ScriptBuf::from_bytes([&[0x51, 0x20][..], &x[..]].concat())
}

/// P2WPKH redeem script wrapped by P2SH-P2WPKH spends
pub fn redeem_script(pubkey: &PublicKey) -> ScriptBuf {
    p2wpkh_script(&hash160(&pubkey.serialize()))
}

/// Resolve an address string to its script type, output script and hash.
///
/// Well formed addresses for other coins (unknown base58 prefix or bech32
/// HRP) are [Error::UnsupportedScriptType], malformed addresses and bitcoin
/// addresses for another network are [Error::InvalidAddress].
pub fn address_to_script(address: &str, network: Network) -> Result<OutputScript, Error> {
    let a = Address::from_str(address)
        .map_err(|e| match e {
            ParseError::UnknownHrp(_) | ParseError::InvalidLegacyPrefix(_) => {
                Error::UnsupportedScriptType(format!("{address}: {e}"))
            }
            _ => Error::InvalidAddress(format!("{address}: {e}")),
        })?
        .require_network(network)
        .map_err(|e| Error::InvalidAddress(format!("{address}: {e}")))?;

    OutputScript::from_script(a.script_pubkey().as_bytes())
}

/// Derive the output script for a public key and script type
///
/// Taproot scripts commit to the [tweaked][tweak] x-only key.
pub fn pubkey_to_script(
    pubkey: &PublicKey,
    script_type: ScriptType,
) -> Result<OutputScript, Error> {
    let h = hash160(&pubkey.serialize());

    let (script, hash) = match script_type {
        ScriptType::P2pkh => (p2pkh_script(&h), h.to_vec()),
        ScriptType::P2wpkh => (p2wpkh_script(&h), h.to_vec()),
        ScriptType::P2shP2wpkh => {
            let sh = hash160(p2wpkh_script(&h).as_bytes());
            (p2sh_script(&sh), sh.to_vec())
        }
        ScriptType::P2tr => {
            let x = tweak(&pubkey.serialize())?.serialize();
            (p2tr_script(&x), x.to_vec())
        }
        ScriptType::P2wsh => {
            return Err(Error::UnsupportedScriptType(
                "P2WSH has no single key form".to_string(),
            ))
        }
    };

    Ok(OutputScript {
        script_type,
        script,
        hash,
    })
}

/// Derive the address and output script for a public key and script type
pub fn pubkey_to_address_and_script(
    pubkey: &PublicKey,
    script_type: ScriptType,
    network: Network,
) -> Result<(String, OutputScript), Error> {
    let s = pubkey_to_script(pubkey, script_type)?;

    let a = Address::from_script(&s.script, network)
        .map_err(|e| Error::InvalidAddress(e.to_string()))?;

    Ok((a.to_string(), s))
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn key(s: &str) -> PublicKey {
        PublicKey::from_slice(&hex::decode(s).unwrap()).unwrap()
    }

    #[test]
    fn script_type_tags() {
        for t in ScriptType::iter() {
            assert_eq!(ScriptType::try_from(t.tag()).ok(), Some(t));
            assert_eq!(ScriptType::from_str(&t.to_string()).unwrap(), t);
        }

        assert_eq!(ScriptType::from_str("p2sh-p2wpkh").unwrap(), ScriptType::P2shP2wpkh);
        assert!(ScriptType::from_str("P2SH").is_err());
    }

    #[test]
    fn pubkey_addresses() {
        let k = key(G);

        let tests = &[
            (ScriptType::P2pkh, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"),
            (ScriptType::P2wpkh, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"),
            (ScriptType::P2shP2wpkh, "3JvL6Ymt8MVWiCNHC7oWU6nLeHNJKLZGLN"),
        ];

        for (t, expected) in tests {
            let (a, s) = pubkey_to_address_and_script(&k, *t, Network::Bitcoin).unwrap();
            assert_eq!(&a, expected);
            assert_eq!(s.script_type, *t);
        }
    }

    /// BIP86 test vector (m/86'/0'/0'/0/0)
    #[test]
    fn taproot_address() {
        let k = key("02cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115");

        let (a, s) = pubkey_to_address_and_script(&k, ScriptType::P2tr, Network::Bitcoin).unwrap();
        assert_eq!(
            a,
            "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr"
        );
        assert_eq!(
            hex::encode(&s.hash),
            "a60869f0dbcf1dc659c9cecbaf8050135ea9e8cdc487053f1dc6880949dc684c"
        );

        // Address derivation and argument encoding share the same tweak
        assert_eq!(&s.hash[..], &tweak(&k.serialize()).unwrap().serialize()[..]);
    }

    #[test]
    fn address_round_trip() {
        let k = key(G);

        for t in ScriptType::iter().filter(|t| *t != ScriptType::P2wsh) {
            for n in [Network::Bitcoin, Network::Testnet, Network::Regtest] {
                let (a, s) = pubkey_to_address_and_script(&k, t, n).unwrap();
                let r = address_to_script(&a, n).unwrap();

                assert_eq!(r, s, "round trip {t} on {n}");
            }
        }
    }

    #[test]
    fn padded_hashes() {
        let s = address_to_script("1cMh228HTCiwS8ZsaakH8A8wze1JR5ZsP", Network::Bitcoin).unwrap();
        assert_eq!(s.script_type, ScriptType::P2pkh);
        assert_eq!(
            hex::encode(s.padded_hash()),
            "00000000000000000000000006afd46bcdfd22ef94ac122aa11f241244a37ecc"
        );

        let s = address_to_script(
            "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr",
            Network::Bitcoin,
        )
        .unwrap();
        assert_eq!(s.script_type, ScriptType::P2tr);
        assert_eq!(&s.padded_hash()[..], &s.hash[..]);
    }

    #[test]
    fn p2wsh_output() {
        let program = [0x11u8; 32];
        let script = [&[0x00, 0x20][..], &program[..]].concat();
        let a = Address::from_script(&ScriptBuf::from_bytes(script), Network::Bitcoin).unwrap();

        let s = address_to_script(&a.to_string(), Network::Bitcoin).unwrap();
        assert_eq!(s.script_type, ScriptType::P2wsh);
        assert_eq!(s.hash, program.to_vec());

        let k = key(G);
        assert!(matches!(
            pubkey_to_script(&k, ScriptType::P2wsh),
            Err(Error::UnsupportedScriptType(_))
        ));
    }

    #[test]
    fn invalid_addresses() {
        // Bad checksum
        assert!(matches!(
            address_to_script("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMJ", Network::Bitcoin),
            Err(Error::InvalidAddress(_))
        ));

        // Wrong network
        assert!(matches!(
            address_to_script("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4", Network::Testnet),
            Err(Error::InvalidAddress(_))
        ));

        // Truncated
        assert!(matches!(
            address_to_script("bc1qqqqsyqcyq5rqwzqfpg9scrgwpugpzysn4v03", Network::Bitcoin),
            Err(Error::InvalidAddress(_))
        ));

        // Unsupported witness version
        let script = [&[0x52, 0x20][..], &[0x22; 32][..]].concat();
        assert!(matches!(
            OutputScript::from_script(&script),
            Err(Error::UnsupportedScriptType(_))
        ));
    }

    #[test]
    fn foreign_addresses() {
        // Same 20 byte hash, bitcoin encodings
        for a in [
            "112D2adLM3UKy4Z4giRbReR6gjWuvHUqB",
            "bc1qqqqsyqcyq5rqwzqfpg9scrgwpugpzysn4v0345",
        ] {
            assert!(address_to_script(a, Network::Bitcoin).is_ok(), "{a}");
        }

        // Litecoin P2PKH prefix and bech32 HRP
        for a in [
            "LKDyUEtTR1HXamkiEphisSiBJu6o3ZPE34",
            "ltc1qqqqsyqcyq5rqwzqfpg9scrgwpugpzysn3s44dy",
        ] {
            let r = address_to_script(a, Network::Bitcoin);
            assert!(matches!(r, Err(Error::UnsupportedScriptType(_))), "{a}: {r:?}");
        }
    }
}
