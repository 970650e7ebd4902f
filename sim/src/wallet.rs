// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Simulated device wallet
//!
//! Derives account keys `m / purpose' / 0' / 0'` from a seed and produces
//! raw (pre-encryption) input signatures as a device would.

use bitcoin::{
    bip32::{ChildNumber, Xpriv, Xpub},
    secp256k1::{constants::CURVE_ORDER, ecdsa, Message, PublicKey, Secp256k1, SecretKey},
    Network,
};

use seal_core::{tweak::tweak_keypair, ScriptType};

/// Deterministic test wallet
#[derive(Clone)]
pub struct Wallet {
    master: Xpriv,
    secp: Secp256k1<bitcoin::secp256k1::All>,
    /// Emit high-S ECDSA signatures
    high_s: bool,
}

impl core::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Wallet({})", self.master.fingerprint(&self.secp))
    }
}

impl Wallet {
    /// Create a wallet from seed bytes
    pub fn from_seed(seed: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            master: Xpriv::new_master(Network::Bitcoin, seed)?,
            secp: Secp256k1::new(),
            high_s: false,
        })
    }

    /// Produce malleated high-S ECDSA signatures
    pub fn with_high_s(mut self) -> Self {
        self.high_s = true;
        self
    }

    fn account(&self, purpose: u32) -> anyhow::Result<Xpriv> {
        let path = [
            ChildNumber::from_hardened_idx(purpose)?,
            ChildNumber::from_hardened_idx(0)?,
            ChildNumber::from_hardened_idx(0)?,
        ];

        Ok(self.master.derive_priv(&self.secp, &path)?)
    }

    /// Account extended public key for a purpose
    pub fn account_xpub(&self, purpose: u32) -> anyhow::Result<Xpub> {
        let a = self.account(purpose)?;
        Ok(Xpub::from_priv(&self.secp, &a))
    }

    /// Secret key at `m / purpose' / 0' / 0' / 0 / index`
    pub fn secret_key(&self, purpose: u32, index: u32) -> anyhow::Result<SecretKey> {
        let path = [
            ChildNumber::from_normal_idx(0)?,
            ChildNumber::from_normal_idx(index)?,
        ];

        let k = self.account(purpose)?.derive_priv(&self.secp, &path)?;

        Ok(k.private_key)
    }

    /// Public key at `m / purpose' / 0' / 0' / 0 / index`
    pub fn public_key(&self, purpose: u32, index: u32) -> anyhow::Result<PublicKey> {
        let k = self.secret_key(purpose, index)?;
        Ok(PublicKey::from_secret_key(&self.secp, &k))
    }

    /// Sign a sighash, returning DER for ECDSA script types or the 64-byte
    /// BIP340 signature (with the BIP86 tweaked key) for P2TR
    pub fn sign(
        &self,
        script_type: ScriptType,
        purpose: u32,
        index: u32,
        sighash: [u8; 32],
    ) -> anyhow::Result<Vec<u8>> {
        let k = self.secret_key(purpose, index)?;
        let m = Message::from_digest(sighash);

        if script_type == ScriptType::P2tr {
            let kp = tweak_keypair(&k)?;
            let s = self.secp.sign_schnorr_no_aux_rand(&m, &kp);
            return Ok(s.serialize().to_vec());
        }

        let s = self.secp.sign_ecdsa(&m, &k);
        let s = match self.high_s {
            true => ecdsa::Signature::from_compact(&negate_s(s.serialize_compact()))?,
            false => s,
        };

        Ok(s.serialize_der().to_vec())
    }
}

/// Replace `s` with `n - s` in a compact signature
fn negate_s(mut c: [u8; 64]) -> [u8; 64] {
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let v = CURVE_ORDER[i] as i16 - c[32 + i] as i16 - borrow;
        borrow = (v < 0) as i16;
        c[32 + i] = v.rem_euclid(256) as u8;
    }
    c
}

#[cfg(test)]
mod test {
    use bitcoin::secp256k1::XOnlyPublicKey;

    use seal_core::{signature::CanonicalSignature, tweak::tweak};

    use super::*;

    fn wallet() -> Wallet {
        Wallet::from_seed(&[0x5e; 32]).unwrap()
    }

    #[test]
    fn account_derivation_matches_keys() {
        let w = wallet();
        let secp = Secp256k1::verification_only();

        let path = [
            ChildNumber::from_normal_idx(0).unwrap(),
            ChildNumber::from_normal_idx(7).unwrap(),
        ];
        let child = w.account_xpub(84).unwrap().derive_pub(&secp, &path).unwrap();

        assert_eq!(child.public_key, w.public_key(84, 7).unwrap());
        assert_ne!(w.public_key(84, 7).unwrap(), w.public_key(44, 7).unwrap());
    }

    #[test]
    fn ecdsa_signatures() {
        let w = wallet();
        let digest = [0x42; 32];
        let pk = w.public_key(84, 0).unwrap();
        let secp = Secp256k1::verification_only();

        let low = w.sign(ScriptType::P2wpkh, 84, 0, digest).unwrap();
        let high = w
            .clone()
            .with_high_s()
            .sign(ScriptType::P2wpkh, 84, 0, digest)
            .unwrap();

        assert_ne!(low, high);
        assert!(CanonicalSignature::from_der(&low).is_ok());

        // Normalised high-S signature matches the original
        let n = CanonicalSignature::from_der(&high).unwrap();
        assert!(n.is_low_s());
        assert_eq!(n.to_der(), low);

        secp.verify_ecdsa(&Message::from_digest(digest), n.as_ecdsa(), &pk)
            .unwrap();
    }

    #[test]
    fn schnorr_signatures() {
        let w = wallet();
        let digest = [0x24; 32];
        let pk = w.public_key(86, 3).unwrap();
        let secp = Secp256k1::verification_only();

        let raw = w.sign(ScriptType::P2tr, 86, 3, digest).unwrap();
        assert_eq!(raw.len(), 64);

        let output_key: XOnlyPublicKey = tweak(&pk.serialize()).unwrap();
        let sig = bitcoin::secp256k1::schnorr::Signature::from_slice(&raw).unwrap();

        secp.verify_schnorr(&sig, &Message::from_digest(digest), &output_key)
            .unwrap();
    }
}
