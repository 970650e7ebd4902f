// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure element transaction engine
//!
//! This provides the host-side transaction logic required to drive a
//! secure element through a signing session, independent of the transport
//! or device session used to reach it (see `seal` for the session / flow
//! implementation and `seal-apdu` for wire encodings).
//!
//! ## Operations
//!
//! 1. Resolve input / change public keys (a key provider is
//!    expected to populate [Input::pubkey][types::Input] and
//!    [Change::pubkey][types::Change] prior to preparation)
//! 2. Build a [PreparedData][prepare::PreparedData] snapshot using the
//!    [UnsignedTxBuilder][prepare::UnsignedTxBuilder]. This fixes the byte
//!    layout of the transaction for the remainder of the session.
//! 3. [Select][argument::select] an [ArgumentEncodingStrategy][argument::ArgumentEncodingStrategy]
//!    for the device firmware generation and input script type, then encode
//!    the global argument and one argument per input.
//! 4. Following device execution, [post-process][signature::post_process]
//!    decrypted signatures into canonical form, optionally verifying them
//!    against locally computed [sighashes][sighash].
//! 5. [Compose][compose::compose] the final signed transaction.
//!
//! Taproot keys are tweaked via [tweak::tweak], shared by address derivation
//! and argument encoding.

pub mod argument;

pub mod compose;

mod error;
pub use error::Error;

pub mod helpers;

pub mod prepare;

pub mod script;
pub use script::{OutputScript, ScriptType};

pub mod sighash;

pub mod signature;

pub mod tweak;

pub mod types;
pub use types::{Change, Input, Output};

pub use bitcoin::{secp256k1, Network};
