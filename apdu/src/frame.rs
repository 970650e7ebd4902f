// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command frame encoding
//!
//! ## Header encoding:
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      PID      |    HDR_LEN    |      CLA      |      INS      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |       P1      |       P2      |  PAYLOAD_LEN  |CHECKSUMMED_LEN|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    PACKETS    |
//! +-+-+-+-+-+-+-+-+
//! ```
//!
//! Frame data is the payload followed by a single XOR checksum byte.

use encdec::{DecodeOwned, Encode};
use log::trace;

use crate::{ApduError, Command, Status, Target};

/// Protocol identifier
pub const PROTOCOL_ID: u8 = 0x00;

/// Encoded header length
pub const HEADER_LEN: usize = 9;

/// Per-packet data budget for packetised links
pub const PACKET_SIZE: usize = 18;

/// Maximum payload carried by a single frame
pub const MAX_PAYLOAD: usize = 250;

/// Fixed command frame header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    /// Payload length, excluding checksum
    pub payload_len: u8,
    /// Payload length including checksum
    pub checksummed_len: u8,
    /// Number of [PACKET_SIZE] packets required for the frame data
    pub packets: u8,
}

impl Encode for FrameHeader {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(HEADER_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        if buff.len() < HEADER_LEN {
            return Err(ApduError::InvalidLength);
        }

        buff[..HEADER_LEN].copy_from_slice(&[
            PROTOCOL_ID,
            HEADER_LEN as u8,
            self.cla,
            self.ins,
            self.p1,
            self.p2,
            self.payload_len,
            self.checksummed_len,
            self.packets,
        ]);

        Ok(HEADER_LEN)
    }
}

impl DecodeOwned for FrameHeader {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), ApduError> {
        if buff.len() < HEADER_LEN {
            return Err(ApduError::InvalidLength);
        }

        if buff[0] != PROTOCOL_ID || buff[1] as usize != HEADER_LEN {
            return Err(ApduError::InvalidHeader);
        }

        let h = Self {
            cla: buff[2],
            ins: buff[3],
            p1: buff[4],
            p2: buff[5],
            payload_len: buff[6],
            checksummed_len: buff[7],
            packets: buff[8],
        };

        Ok((h, HEADER_LEN))
    }
}

/// XOR checksum over payload bytes
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |a, b| a ^ b)
}

/// Encoded command frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    /// Payload followed by checksum (empty for empty payloads)
    pub data: Vec<u8>,
}

impl Frame {
    /// Encode a command and payload into a frame
    pub fn encode(command: &Command, payload: &[u8]) -> Result<Self, ApduError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(ApduError::PayloadTooLarge(payload.len()));
        }

        let mut data = payload.to_vec();
        if !data.is_empty() {
            data.push(checksum(payload));
        }

        let header = FrameHeader {
            cla: command.cla,
            ins: command.ins,
            p1: command.p1,
            p2: command.p2,
            payload_len: payload.len() as u8,
            checksummed_len: data.len() as u8,
            packets: ((data.len() + PACKET_SIZE - 1) / PACKET_SIZE) as u8,
        };

        trace!("frame {command}: {} bytes, {} packets", data.len(), header.packets);

        Ok(Self { header, data })
    }

    /// Encoded header bytes
    pub fn header_bytes(&self) -> Result<[u8; HEADER_LEN], ApduError> {
        let mut b = [0u8; HEADER_LEN];
        self.header.encode(&mut b)?;
        Ok(b)
    }

    /// Split frame data into [PACKET_SIZE] packets for packetised links
    pub fn packets(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks(PACKET_SIZE)
    }

    /// Parse a frame received by a device, validating lengths and checksum.
    ///
    /// Returns the header and the payload with the checksum stripped.
    pub fn parse<'a>(header: &[u8], data: &'a [u8]) -> Result<(FrameHeader, &'a [u8]), ApduError> {
        let (h, _) = FrameHeader::decode_owned(header)?;

        if h.checksummed_len as usize != data.len() {
            return Err(ApduError::InvalidLength);
        }

        if data.is_empty() {
            if h.payload_len != 0 || h.packets != 0 {
                return Err(ApduError::InvalidHeader);
            }
            return Ok((h, data));
        }

        if h.payload_len as usize + 1 != data.len() {
            return Err(ApduError::InvalidHeader);
        }

        let (payload, c) = data.split_at(data.len() - 1);
        let expected = checksum(payload);
        if c[0] != expected {
            return Err(ApduError::ChecksumMismatch {
                expected,
                actual: c[0],
            });
        }

        Ok((h, payload))
    }
}

/// Device response, split into status word and output data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub data: Vec<u8>,
}

impl Response {
    /// Split a raw response into status and data according to the command target
    pub fn decode(raw: &[u8], target: Target) -> Result<Self, ApduError> {
        if raw.len() < 2 {
            return Err(ApduError::ShortResponse(raw.len()));
        }

        let (status, data) = match target {
            Target::Se => {
                let (d, s) = raw.split_at(raw.len() - 2);
                (s, d)
            }
            Target::Mcu => raw.split_at(2),
        };

        Ok(Self {
            status: u16::from_be_bytes([status[0], status[1]]),
            data: data.to_vec(),
        })
    }

    /// Encode a response as a device would for the provided target
    pub fn encode(&self, target: Target) -> Vec<u8> {
        let s = self.status.to_be_bytes();
        match target {
            Target::Se => [&self.data[..], &s[..]].concat(),
            Target::Mcu => [&s[..], &self.data[..]].concat(),
        }
    }

    /// Check whether the response reports success
    pub fn is_success(&self) -> bool {
        self.status == Status::Success as u16
    }
}
