// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Signature post-processing
//!
//! Signatures are returned by the device encrypted under a single-use
//! session key (AES-256-CBC, zero IV, PKCS#7). ECDSA signatures are then
//! normalised to canonical low-S form, schnorr signatures pass through.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use bitcoin::secp256k1::ecdsa;
use const_decoder::Decoder;
use zeroize::Zeroize;

use crate::{Error, ScriptType};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Session key length
pub const SESSION_KEY_LEN: usize = 32;

/// Schnorr signature length
pub const SCHNORR_SIG_LEN: usize = 64;

/// Half the secp256k1 curve order, the maximum canonical `s` value
pub const HALF_ORDER: [u8; 32] =
    Decoder::Hex.decode(b"7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0");

const ZERO_IV: [u8; 16] = [0u8; 16];

/// Device-issued single-use signature decryption key, zeroed on drop
#[derive(Clone, PartialEq)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    pub fn from_slice(b: &[u8]) -> Result<Self, Error> {
        let k: [u8; SESSION_KEY_LEN] = b
            .try_into()
            .map_err(|_| Error::InvalidKeyLength(b.len()))?;
        Ok(Self(k))
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl core::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SessionKey(..)")
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Decrypt a device signature blob
pub fn decrypt(encrypted: &[u8], key: &SessionKey) -> Result<Vec<u8>, Error> {
    Aes256CbcDec::new(&key.0.into(), &ZERO_IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(encrypted)
        .map_err(|_| Error::Decryption)
}

/// Encrypt a signature blob (device side)
pub fn encrypt(plain: &[u8], key: &SessionKey) -> Vec<u8> {
    Aes256CbcEnc::new(&key.0.into(), &ZERO_IV.into()).encrypt_padded_vec_mut::<Pkcs7>(plain)
}

/// Canonical (low-S) ECDSA signature
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct CanonicalSignature(ecdsa::Signature);

impl CanonicalSignature {
    /// Parse a DER signature, normalising `s` to `min(s, n - s)`
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let mut sig = ecdsa::Signature::from_der_lax(der).map_err(|_| Error::InvalidSignature)?;
        sig.normalize_s();

        Ok(Self(sig))
    }

    pub fn r(&self) -> [u8; 32] {
        let mut r = [0u8; 32];
        r.copy_from_slice(&self.0.serialize_compact()[..32]);
        r
    }

    pub fn s(&self) -> [u8; 32] {
        let mut s = [0u8; 32];
        s.copy_from_slice(&self.0.serialize_compact()[32..]);
        s
    }

    /// Check `s` lies in the lower half of the curve order
    pub fn is_low_s(&self) -> bool {
        self.s() <= HALF_ORDER
    }

    /// Fixed 64-byte `r ‖ s` form
    pub fn to_compact(&self) -> [u8; 64] {
        self.0.serialize_compact()
    }

    /// Fixed 65-byte `r ‖ s ‖ v` form
    pub fn to_compact_recoverable(&self, recovery_id: u8) -> [u8; 65] {
        let mut b = [0u8; 65];
        b[..64].copy_from_slice(&self.to_compact());
        b[64] = recovery_id;
        b
    }

    /// DER encoding
    pub fn to_der(&self) -> Vec<u8> {
        self.0.serialize_der().to_vec()
    }

    pub fn as_ecdsa(&self) -> &ecdsa::Signature {
        &self.0
    }
}

impl core::fmt::Debug for CanonicalSignature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "CanonicalSignature {{ r: {}, s: {} }}",
            hex::encode(self.r()),
            hex::encode(self.s())
        )
    }
}

/// Post-processed input signature
#[derive(Clone, Debug, PartialEq)]
pub enum ProcessedSignature {
    Ecdsa(CanonicalSignature),
    Schnorr([u8; SCHNORR_SIG_LEN]),
}

/// Normalise a decrypted signature for the input script type
pub fn post_process(raw: &[u8], script_type: ScriptType) -> Result<ProcessedSignature, Error> {
    match script_type {
        ScriptType::P2tr => {
            let s: [u8; SCHNORR_SIG_LEN] = raw.try_into().map_err(|_| Error::InvalidSignature)?;
            Ok(ProcessedSignature::Schnorr(s))
        }
        _ => CanonicalSignature::from_der(raw).map(ProcessedSignature::Ecdsa),
    }
}
