// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / APDU definitions for secure element communication
//!
//! Every command exchanged with the device is wrapped in a fixed 9-byte
//! [frame][frame::Frame] header followed by the payload and an XOR checksum.
//! Firmware parses the header positionally so the layout here is bit-exact:
//!
//! ```text
//! +-----+---------+-----+-----+----+----+-------------+-----------------+---------+
//! | PID | HDR_LEN | CLA | INS | P1 | P2 | PAYLOAD_LEN | CHECKSUMMED_LEN | PACKETS |
//! +-----+---------+-----+-----+----+----+-------------+-----------------+---------+
//! ```
//!
//! Payloads exceeding a single frame (or flagged sensitive) are carried over
//! the [secure channel][secure], which splits a hashed and salted envelope
//! into indexed fragments and verifies the device's response hash.
//!
//! Responses carry a two byte status word, trailing for SE targeted commands
//! and leading for MCU targeted commands (see [frame::Response]).

pub mod command;
pub use command::{Command, Instruction, Target};

pub mod frame;
pub use frame::{Frame, FrameHeader, Response};

pub mod secure;
pub use secure::{CipherHeader, SecureChannel, SealedRequest};

pub mod status;
pub use status::Status;

mod transport;
pub use transport::Transport;

mod error;
pub use error::ApduError;

/// Secure element command class
pub const SE_CLA: u8 = 0x80;

/// MCU command class
pub const MCU_CLA: u8 = 0x7f;
