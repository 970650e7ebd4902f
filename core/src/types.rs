// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Caller-facing transaction descriptions

use bitcoin::{secp256k1::PublicKey, Txid};

/// Default input sequence
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;

/// Transaction input
#[derive(Clone, Debug, PartialEq)]
pub struct Input {
    /// Previous transaction hash, in natural (display) order
    pub prev_tx_hash: Txid,
    /// Previous output index
    pub prev_index: u32,
    /// Previous output value, decimal string in satoshis
    pub prev_value: String,
    pub sequence: u32,
    /// Key derivation path leaf
    pub address_index: u32,
    /// Derivation purpose override
    pub purpose: Option<u32>,
    /// Public key, resolved via a key provider before preparation
    pub pubkey: Option<PublicKey>,
}

impl Input {
    /// Create an input with default sequence and no resolved key
    pub fn new(prev_tx_hash: Txid, prev_index: u32, prev_value: &str, address_index: u32) -> Self {
        Self {
            prev_tx_hash,
            prev_index,
            prev_value: prev_value.to_string(),
            sequence: DEFAULT_SEQUENCE,
            address_index,
            purpose: None,
            pubkey: None,
        }
    }
}

/// Primary transaction output
#[derive(Clone, Debug, PartialEq)]
pub struct Output {
    pub address: String,
    /// Decimal string in satoshis
    pub value: String,
}

impl Output {
    pub fn new(address: &str, value: &str) -> Self {
        Self {
            address: address.to_string(),
            value: value.to_string(),
        }
    }
}

/// Change output, paid to a key of the signing account
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub address_index: u32,
    /// Decimal string in satoshis
    pub value: String,
    pub purpose: Option<u32>,
    pub pubkey: Option<PublicKey>,
}

impl Change {
    pub fn new(address_index: u32, value: &str) -> Self {
        Self {
            address_index,
            value: value.to_string(),
            purpose: None,
            pubkey: None,
        }
    }
}
