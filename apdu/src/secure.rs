// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure channel framing
//!
//! Oversized or sensitive payloads are wrapped in a salted, hashed envelope
//! and streamed to the device as indexed fragments (`P1 = index`,
//! `P2 = total`). The device answers the final fragment with a hash over its
//! output and an echo of the request salt, both of which must be verified.
//!
//! ## Request envelope:
//! ```text
//! +---------+--------+------+------------+--------+-------------+
//! | VERSION | SECURE | SIGN | APDU_HDR(4)| HASH(32)| SALT(4) | PAYLOAD...
//! +---------+--------+------+------------+--------+-------------+
//! HASH = SHA256(APDU_HDR ‖ SALT ‖ PAYLOAD)
//! ```
//!
//! ## Response:
//! ```text
//! +--------------+---------+-----------+
//! | CONFIRM_HASH | SALT(4) | OUTPUT... |
//! +--------------+---------+-----------+
//! CONFIRM_HASH = SHA256(SALT ‖ OUTPUT)
//! ```

use log::debug;
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

use crate::{ApduError, Command};

/// Secure channel protocol version
pub const CHANNEL_VERSION: u8 = 0x01;

/// Maximum fragment size
pub const FRAGMENT_SIZE: usize = 250;

/// Fragment indices are carried in a single byte
pub const MAX_FRAGMENTS: usize = 255;

pub const SALT_LEN: usize = 4;

pub const HASH_LEN: usize = 32;

pub const CIPHER_HEADER_LEN: usize = 3;

bitflags::bitflags! {
    /// Secure channel mode flags, as carried on the wire.
    ///
    /// Envelopes are integrity protected plaintext, hosts never set
    /// [ChannelFlags::SECURE] and devices reject envelopes that do.
    pub struct ChannelFlags: u8 {
        /// Encrypted envelope (unsupported)
        const SECURE = 1 << 0;
        /// Envelope is signed
        const SIGN = 1 << 1;
    }
}

/// Cipher header prefixed to each envelope
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CipherHeader {
    pub version: u8,
    pub flags: ChannelFlags,
}

impl Default for CipherHeader {
    fn default() -> Self {
        Self {
            version: CHANNEL_VERSION,
            flags: ChannelFlags::empty(),
        }
    }
}

impl CipherHeader {
    pub fn to_bytes(&self) -> [u8; CIPHER_HEADER_LEN] {
        [
            self.version,
            self.flags.contains(ChannelFlags::SECURE) as u8,
            self.flags.contains(ChannelFlags::SIGN) as u8,
        ]
    }

    pub fn from_bytes(buff: &[u8]) -> Result<Self, ApduError> {
        if buff.len() < CIPHER_HEADER_LEN {
            return Err(ApduError::InvalidLength);
        }

        if buff[0] != CHANNEL_VERSION {
            return Err(ApduError::ChannelVersion(buff[0]));
        }

        let mut flags = ChannelFlags::empty();
        flags.set(ChannelFlags::SECURE, buff[1] != 0);
        flags.set(ChannelFlags::SIGN, buff[2] != 0);

        Ok(Self {
            version: buff[0],
            flags,
        })
    }
}

/// Host side of the secure channel
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SecureChannel {
    header: CipherHeader,
}

impl SecureChannel {
    /// Wrap a command payload using a freshly generated salt
    pub fn seal<R: RngCore + CryptoRng>(
        &self,
        command: &Command,
        payload: &[u8],
        rng: &mut R,
    ) -> Result<SealedRequest, ApduError> {
        let mut salt = [0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);

        self.seal_with_salt(command, payload, salt)
    }

    /// Wrap a command payload with the provided salt
    pub fn seal_with_salt(
        &self,
        command: &Command,
        payload: &[u8],
        salt: [u8; SALT_LEN],
    ) -> Result<SealedRequest, ApduError> {
        let apdu_header = command.header();

        let hash = Sha256::new()
            .chain_update(apdu_header)
            .chain_update(salt)
            .chain_update(payload)
            .finalize();

        let mut envelope = Vec::with_capacity(
            CIPHER_HEADER_LEN + apdu_header.len() + HASH_LEN + SALT_LEN + payload.len(),
        );
        envelope.extend_from_slice(&self.header.to_bytes());
        envelope.extend_from_slice(&apdu_header);
        envelope.extend_from_slice(&hash);
        envelope.extend_from_slice(&salt);
        envelope.extend_from_slice(payload);

        let n = (envelope.len() + FRAGMENT_SIZE - 1) / FRAGMENT_SIZE;
        if n > MAX_FRAGMENTS {
            return Err(ApduError::TooManyFragments(n));
        }

        debug!("sealed {command}: {} bytes in {n} fragments", payload.len());

        Ok(SealedRequest { salt, envelope })
    }
}

/// Sealed envelope awaiting transfer
#[derive(Clone, Debug, PartialEq)]
pub struct SealedRequest {
    salt: [u8; SALT_LEN],
    envelope: Vec<u8>,
}

impl SealedRequest {
    /// Salt sent with this request, echoed by the device
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// Number of fragments required to transfer the envelope
    pub fn fragment_count(&self) -> usize {
        (self.envelope.len() + FRAGMENT_SIZE - 1) / FRAGMENT_SIZE
    }

    /// Fragment commands and data, in transfer order
    pub fn fragments(&self) -> impl Iterator<Item = (Command, &[u8])> {
        let total = self.fragment_count() as u8;

        self.envelope
            .chunks(FRAGMENT_SIZE)
            .enumerate()
            .map(move |(i, c)| (Command::SEND_FRAGMENT.with_params(i as u8, total), c))
    }

    /// Verify and extract output data from the final fragment response
    pub fn open_response(&self, data: &[u8]) -> Result<Vec<u8>, ApduError> {
        open_response(data, &self.salt)
    }
}

/// Envelope opened by a device
#[derive(Clone, Debug, PartialEq)]
pub struct OpenedRequest<'a> {
    pub cipher: CipherHeader,
    pub apdu_header: [u8; 4],
    pub salt: [u8; SALT_LEN],
    pub payload: &'a [u8],
}

/// Open a reassembled envelope (device side), verifying the request hash
pub fn open_request(envelope: &[u8]) -> Result<OpenedRequest<'_>, ApduError> {
    let min = CIPHER_HEADER_LEN + 4 + HASH_LEN + SALT_LEN;
    if envelope.len() < min {
        return Err(ApduError::InvalidLength);
    }

    let cipher = CipherHeader::from_bytes(envelope)?;
    if cipher.flags.contains(ChannelFlags::SECURE) {
        return Err(ApduError::EncryptedEnvelope);
    }

    let mut index = CIPHER_HEADER_LEN;

    let mut apdu_header = [0u8; 4];
    apdu_header.copy_from_slice(&envelope[index..][..4]);
    index += 4;

    let hash = &envelope[index..][..HASH_LEN];
    index += HASH_LEN;

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&envelope[index..][..SALT_LEN]);
    index += SALT_LEN;

    let payload = &envelope[index..];

    let expected = Sha256::new()
        .chain_update(apdu_header)
        .chain_update(salt)
        .chain_update(payload)
        .finalize();
    if hash != &expected[..] {
        return Err(ApduError::IntegrityMismatch);
    }

    Ok(OpenedRequest {
        cipher,
        apdu_header,
        salt,
        payload,
    })
}

/// Build a final fragment response (device side)
pub fn seal_response(salt: &[u8; SALT_LEN], output: &[u8]) -> Vec<u8> {
    let hash = Sha256::new()
        .chain_update(salt)
        .chain_update(output)
        .finalize();

    [&hash[..], &salt[..], output].concat()
}

/// Verify a final fragment response against the salt sent, returning the output
pub fn open_response(data: &[u8], salt: &[u8; SALT_LEN]) -> Result<Vec<u8>, ApduError> {
    if data.len() < HASH_LEN + SALT_LEN {
        return Err(ApduError::InvalidLength);
    }

    let (confirm_hash, rest) = data.split_at(HASH_LEN);
    let (confirm_salt, output) = rest.split_at(SALT_LEN);

    if confirm_salt != &salt[..] {
        return Err(ApduError::SaltMismatch);
    }

    let expected = Sha256::new()
        .chain_update(confirm_salt)
        .chain_update(output)
        .finalize();
    if confirm_hash != &expected[..] {
        return Err(ApduError::IntegrityMismatch);
    }

    Ok(output.to_vec())
}
