// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Hashing and serialisation helpers

use sha2::{Digest, Sha256};

use bitcoin::hashes::{hash160, Hash};

/// Single SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let h = Sha256::digest(data);
    Sha256::digest(h).into()
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}

/// Write a bitcoin compact size integer
pub fn write_compact_size(buff: &mut Vec<u8>, n: usize) {
    match n {
        0..=0xfc => buff.push(n as u8),
        0xfd..=0xffff => {
            buff.push(0xfd);
            buff.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            buff.push(0xfe);
            buff.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buff.push(0xff);
            buff.extend_from_slice(&(n as u64).to_le_bytes());
        }
    }
}

/// Write length-prefixed bytes
pub fn write_var_bytes(buff: &mut Vec<u8>, data: &[u8]) {
    write_compact_size(buff, data.len());
    buff.extend_from_slice(data);
}

/// Write a minimal script data push
pub fn write_push(buff: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0..=0x4b => buff.push(data.len() as u8),
        0x4c..=0xff => {
            buff.push(0x4c);
            buff.push(data.len() as u8);
        }
        n => {
            buff.push(0x4d);
            buff.extend_from_slice(&(n as u16).to_le_bytes());
        }
    }
    buff.extend_from_slice(data);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compact_size() {
        let tests: &[(usize, &[u8])] = &[
            (0, &[0x00]),
            (0xfc, &[0xfc]),
            (0xfd, &[0xfd, 0xfd, 0x00]),
            (0x1234, &[0xfd, 0x34, 0x12]),
            (0x10000, &[0xfe, 0x00, 0x00, 0x01, 0x00]),
        ];

        for (n, expected) in tests {
            let mut b = vec![];
            write_compact_size(&mut b, *n);
            assert_eq!(&b, expected, "compact size {n}");
        }
    }

    #[test]
    fn pushes() {
        let mut b = vec![];
        write_push(&mut b, &[0xaa; 3]);
        assert_eq!(b, vec![0x03, 0xaa, 0xaa, 0xaa]);

        let mut b = vec![];
        write_push(&mut b, &[0xaa; 80]);
        assert_eq!(&b[..2], &[0x4c, 80]);
        assert_eq!(b.len(), 82);
    }

    #[test]
    fn hashes() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hex::encode(sha256d(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );

        let g = hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
            .unwrap();
        assert_eq!(
            hex::encode(hash160(&g)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }
}
