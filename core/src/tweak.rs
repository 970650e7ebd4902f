// Copyright (c) 2022-2023 The MobileCoin Foundation

//! BIP340 tagged hashing and BIP341 taproot key tweaking
//!
//! Tag prefixes are precomputed `SHA256(tag)` values, a tagged hash is
//! `SHA256(SHA256(tag) ‖ SHA256(tag) ‖ msg)`.

use bitcoin::secp256k1::{Keypair, Parity, PublicKey, Scalar, Secp256k1, SecretKey, XOnlyPublicKey};
use const_decoder::Decoder;
use sha2::{Digest, Sha256};

use crate::Error;

/// `SHA256("BIP0340/challenge")`
pub const TAG_BIP340_CHALLENGE: [u8; 32] =
    Decoder::Hex.decode(b"7bb52d7a9fef58323eb1bf7a407db382d2f3f2d81bb1224f49fe518f6d48d37c");

/// `SHA256("BIP0340/aux")`
pub const TAG_BIP340_AUX: [u8; 32] =
    Decoder::Hex.decode(b"f1ef4e5ec063cada6d94cafa9d987ea069265839ecc11f972d77a52ed8c1cc90");

/// `SHA256("BIP0340/nonce")`
pub const TAG_BIP340_NONCE: [u8; 32] =
    Decoder::Hex.decode(b"07497734a79bcb355b9b8c7d034f121cf434d73ef72dda19870061fb52bfeb2f");

/// `SHA256("TapLeaf")`
pub const TAG_TAP_LEAF: [u8; 32] =
    Decoder::Hex.decode(b"aeea8fdc4208983105734b58081d1e2638d35f1cb54008d4d357ca03be78e9ee");

/// `SHA256("TapBranch")`
pub const TAG_TAP_BRANCH: [u8; 32] =
    Decoder::Hex.decode(b"1941a1f2e56eb95fa2a9f194be5c01f7216f33ed82b091463490d05bf516a015");

/// `SHA256("TapSighash")`
pub const TAG_TAP_SIGHASH: [u8; 32] =
    Decoder::Hex.decode(b"f40a48df4b2a70c8b4924bf2654661ed3d95fd66a313eb87237597c628e4a031");

/// `SHA256("TapTweak")`
pub const TAG_TAP_TWEAK: [u8; 32] =
    Decoder::Hex.decode(b"e80fe1639c9ca050e3af1b39c143c63e429cbceb15d940fbb5c5a1f4af57c5e9");

/// `SHA256("KeyAgg list")`
pub const TAG_KEYAGG_LIST: [u8; 32] =
    Decoder::Hex.decode(b"481c971c3c0b46d7f0b275ae598d4e2c7ed7319c594a5c6ec79ea0d4990294f0");

/// `SHA256("KeyAgg coefficient")`
pub const TAG_KEYAGG_COEFFICIENT: [u8; 32] =
    Decoder::Hex.decode(b"bfc904034d1c88e8c80e22e53d24566d64824ed6427281c09100f94dcd52c981");

/// Compute a BIP340 tagged hash over the provided message parts
pub fn tagged_hash(tag: &[u8; 32], parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new().chain_update(tag).chain_update(tag);
    for p in parts {
        h.update(p);
    }
    h.finalize().into()
}

/// Tweak a public key for BIP86 key-path spending, returning the x-only output key.
///
/// Accepts either a 33-byte compressed key (prefix byte dropped) or a
/// 32-byte x-only key.
pub fn tweak(pubkey: &[u8]) -> Result<XOnlyPublicKey, Error> {
    let internal = match pubkey.len() {
        33 => {
            let k = PublicKey::from_slice(pubkey).map_err(|_| Error::InvalidPublicKey)?;
            k.x_only_public_key().0
        }
        32 => XOnlyPublicKey::from_slice(pubkey).map_err(|_| Error::InvalidPublicKey)?,
        _ => return Err(Error::InvalidPublicKey),
    };

    tweak_x_only(&internal)
}

/// Tweak an x-only internal key with `TapTweak(key)`
pub fn tweak_x_only(internal: &XOnlyPublicKey) -> Result<XOnlyPublicKey, Error> {
    let t = tagged_hash(&TAG_TAP_TWEAK, &[&internal.serialize()]);
    let t = Scalar::from_be_bytes(t).map_err(|_| Error::InvalidTweak)?;

    let secp = Secp256k1::verification_only();
    let (tweaked, _parity) = internal
        .add_tweak(&secp, &t)
        .map_err(|_| Error::InvalidTweak)?;

    Ok(tweaked)
}

/// Tweak a secret key for BIP86 key-path signing (device side)
///
/// The secret is negated where the internal key has odd y, so the
/// resulting keypair matches [tweak] of the corresponding public key.
pub fn tweak_keypair(secret: &SecretKey) -> Result<Keypair, Error> {
    let secp = Secp256k1::new();

    let (internal, parity) = PublicKey::from_secret_key(&secp, secret).x_only_public_key();
    let secret = match parity {
        Parity::Odd => secret.negate(),
        Parity::Even => *secret,
    };

    let t = tagged_hash(&TAG_TAP_TWEAK, &[&internal.serialize()]);
    let t = Scalar::from_be_bytes(t).map_err(|_| Error::InvalidTweak)?;

    let tweaked = secret.add_tweak(&t).map_err(|_| Error::InvalidTweak)?;

    Ok(Keypair::from_secret_key(&secp, &tweaked))
}
