// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure element signing library
//!
//! Drives a connected secure element through a transaction signing session
//! over any [Transport], then verifies and assembles the signed transaction.
//!
//! ```text
//! Signer -> prepare (seal-core) -> SigningFlow -> DeviceSession -> Transport
//!        <- compose (seal-core) <- post-process <- decrypted signatures
//! ```

/// Re-export `seal-apdu` for consumers
pub use seal_apdu::{self as apdu, Transport};

/// Re-export `seal-core` for consumers
pub use seal_core::{self as engine, Change, Input, Output, ScriptType};

mod config;
pub use config::{DeviceScript, DeviceScripts, SignerConfig};

mod error;
pub use error::Error;

mod handle;
pub use handle::DeviceSession;

pub mod keys;
pub use keys::{AccountKeyCache, AccountKeySource, KeyProvider};

mod signer;
pub use signer::{verify_signatures, SignOutcome, SignRequest, Signer};

pub mod tx;
pub use tx::{FlowOutcome, SigningFlow, TxState};
