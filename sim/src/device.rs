// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Simulated secure element
//!
//! Implements the device side of the command protocol: frame parsing,
//! secure channel reassembly, nonce-bound command signatures and the
//! transaction state machine.

use std::collections::HashMap;

use bitcoin::secp256k1::{ecdsa, Message, PublicKey, Secp256k1, VerifyOnly};
use log::{debug, trace, warn};
use rand::RngCore;
use strum::Display;

use seal_apdu::{
    secure::{open_request, seal_response, SALT_LEN},
    Command, Frame, Instruction, Response, Status, Target, MCU_CLA, SE_CLA,
};
use seal_core::{
    argument::{PATH_LEN, PATH_PREFIX, PATH_TYPE_BIP32},
    signature::{encrypt, SessionKey},
};

/// Nonce length issued by the simulator
pub const NONCE_LEN: usize = 8;

const HARDENED: u32 = 0x8000_0000;

/// Device transaction state
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum DeviceState {
    Idle,
    ScriptLoaded,
    ArgumentLoaded,
    Inputs,
    Finished,
    Confirmed,
    KeyReleased,
}

/// Per-input signing request passed to the simulator's signer
#[derive(Clone, Debug, PartialEq)]
pub struct InputRequest {
    /// Position of the input in execution order
    pub index: usize,
    pub purpose: u32,
    pub address_index: u32,
    /// Per-input argument, command signature removed
    pub argument: Vec<u8>,
}

/// Callback producing raw input signatures
pub type SignFn = Box<dyn FnMut(&InputRequest) -> Vec<u8> + Send>;

/// Simulated device state
pub(crate) struct Device {
    pub se_version: u32,
    app_key: PublicKey,
    secp: Secp256k1<VerifyOnly>,
    pub signer: Option<SignFn>,

    pub state: DeviceState,
    nonce: Option<[u8; NONCE_LEN]>,
    session_key: Option<SessionKey>,
    pub script: Option<Vec<u8>>,
    pub argument: Option<Vec<u8>>,
    pub inputs: Vec<Vec<u8>>,

    /// Secure channel reassembly buffer
    fragments: Vec<u8>,
    fragment_count: usize,

    pub reject_confirmation: bool,
    pub faults: HashMap<u8, Status>,
    pub corrupt_salt: bool,

    /// Logical command log, in receive order
    pub log: Vec<(Instruction, bool)>,
    pub fragments_received: usize,
    pub cleared: usize,
    pub powered_off: usize,
}

impl Device {
    pub fn new(app_key: PublicKey, se_version: u32) -> Self {
        Self {
            se_version,
            app_key,
            secp: Secp256k1::verification_only(),
            signer: None,
            state: DeviceState::Idle,
            nonce: None,
            session_key: None,
            script: None,
            argument: None,
            inputs: vec![],
            fragments: vec![],
            fragment_count: 0,
            reject_confirmation: false,
            faults: HashMap::new(),
            corrupt_salt: false,
            log: vec![],
            fragments_received: 0,
            cleared: 0,
            powered_off: 0,
        }
    }

    /// Handle an encoded frame, returning the encoded response
    pub fn handle(&mut self, header: &[u8], data: &[u8]) -> Vec<u8> {
        let target = match header.get(2) {
            Some(&MCU_CLA) => Target::Mcu,
            _ => Target::Se,
        };

        let (status, data) = match Frame::parse(header, data) {
            Ok((h, payload)) => self.dispatch(h.cla, h.ins, h.p1, h.p2, payload),
            Err(e) => {
                warn!("Frame rejected: {e}");
                (Status::WrongLength, vec![])
            }
        };

        Response {
            status: status as u16,
            data,
        }
        .encode(target)
    }

    fn dispatch(&mut self, cla: u8, ins: u8, p1: u8, p2: u8, payload: &[u8]) -> (Status, Vec<u8>) {
        if cla != SE_CLA && cla != MCU_CLA {
            return (Status::ClaNotSupported, vec![]);
        }

        if ins == Instruction::SendFragment as u8 && cla == SE_CLA {
            return self.fragment(p1, p2, payload);
        }

        match self.execute(cla, ins, p1, p2, payload, false) {
            Ok(d) => (Status::Success, d),
            Err(s) => (s, vec![]),
        }
    }

    /// Buffer a secure channel fragment, executing the wrapped command on the last
    fn fragment(&mut self, index: u8, total: u8, data: &[u8]) -> (Status, Vec<u8>) {
        self.fragments_received += 1;

        if index == 0 {
            self.fragments.clear();
            self.fragment_count = 0;
        }

        if index as usize != self.fragment_count || index >= total {
            warn!("Unexpected fragment {index}/{total}");
            return (Status::WrongParams, vec![]);
        }

        self.fragments.extend_from_slice(data);
        self.fragment_count += 1;

        if self.fragment_count < total as usize {
            return (Status::Success, vec![]);
        }

        let envelope = core::mem::take(&mut self.fragments);
        self.fragment_count = 0;

        let req = match open_request(&envelope) {
            Ok(r) => r,
            Err(e) => {
                warn!("Secure envelope rejected: {e}");
                return (Status::WrongData, vec![]);
            }
        };

        let [cla, ins, p1, p2] = req.apdu_header;
        let mut salt: [u8; SALT_LEN] = req.salt;
        let payload = req.payload.to_vec();

        match self.execute(cla, ins, p1, p2, &payload, true) {
            Ok(out) => {
                if self.corrupt_salt {
                    salt.iter_mut().for_each(|b| *b ^= 0xff);
                }
                (Status::Success, seal_response(&salt, &out))
            }
            Err(s) => (s, vec![]),
        }
    }

    /// Execute a logical command
    fn execute(
        &mut self,
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        payload: &[u8],
        secure: bool,
    ) -> Result<Vec<u8>, Status> {
        let i = Instruction::try_from(ins).map_err(|_| Status::InsNotSupported)?;

        let expected_cla = match i {
            Instruction::PowerOff => MCU_CLA,
            _ => SE_CLA,
        };
        if cla != expected_cla {
            return Err(Status::ClaNotSupported);
        }

        debug!("Execute {i} ({} bytes, secure: {secure})", payload.len());
        self.log.push((i, secure));

        if let Some(s) = self.faults.get(&ins) {
            debug!("Injecting fault {s} for {i}");
            return Err(*s);
        }

        let command = Command {
            cla,
            ins,
            p1,
            p2,
            target: Target::Se,
        };

        match i {
            Instruction::GetSeVersion => Ok(self.se_version.to_be_bytes()[2..].to_vec()),
            Instruction::GetNonce => {
                let mut n = [0u8; NONCE_LEN];
                rand::thread_rng().fill_bytes(&mut n);
                self.nonce = Some(n);
                Ok(n.to_vec())
            }
            Instruction::SendScript => {
                self.check_state(&[DeviceState::Idle])?;
                if payload.is_empty() {
                    return Err(Status::WrongData);
                }

                self.script = Some(payload.to_vec());
                self.argument = None;
                self.inputs.clear();
                self.state = DeviceState::ScriptLoaded;
                Ok(vec![])
            }
            Instruction::ExecuteScript => {
                self.check_state(&[DeviceState::ScriptLoaded])?;
                let arg = self.verify_command(&command, payload)?;

                let mut k = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut k);
                self.session_key = Some(SessionKey::from_slice(&k).map_err(|_| Status::Internal)?);

                self.argument = Some(arg);
                self.state = DeviceState::ArgumentLoaded;
                Ok(vec![])
            }
            Instruction::ExecuteUtxo => {
                self.check_state(&[DeviceState::ArgumentLoaded, DeviceState::Inputs])?;
                let arg = self.verify_command(&command, payload)?;
                self.sign_input(arg)
            }
            Instruction::FinishPrepare => {
                self.check_state(&[DeviceState::Inputs])?;
                self.state = DeviceState::Finished;
                Ok(vec![])
            }
            Instruction::GetTxDetail => {
                self.check_state(&[DeviceState::Finished])?;
                if self.reject_confirmation {
                    return Err(Status::UserCancelled);
                }
                self.state = DeviceState::Confirmed;
                Ok(vec![])
            }
            Instruction::GetTxKey => {
                self.check_state(&[DeviceState::Confirmed])?;
                if !secure {
                    return Err(Status::SecurityStatus);
                }

                let k = self.session_key.as_ref().ok_or(Status::Internal)?;
                let k = k.as_bytes().to_vec();
                self.state = DeviceState::KeyReleased;
                Ok(k)
            }
            Instruction::ClearTx => {
                self.reset();
                self.cleared += 1;
                Ok(vec![])
            }
            Instruction::PowerOff => {
                self.powered_off += 1;
                Ok(vec![])
            }
            Instruction::SendFragment => Err(Status::WrongParams),
        }
    }

    fn check_state(&self, allowed: &[DeviceState]) -> Result<(), Status> {
        match allowed.contains(&self.state) {
            true => Ok(()),
            false => {
                warn!("Command rejected in state {}", self.state);
                Err(Status::WrongTxState)
            }
        }
    }

    /// Verify a signed command, consuming the current nonce
    fn verify_command(&mut self, command: &Command, payload: &[u8]) -> Result<Vec<u8>, Status> {
        let nonce = self.nonce.take().ok_or_else(|| {
            warn!("Signed command without nonce");
            Status::SecurityStatus
        })?;

        // Signature is the trailing DER sequence
        for sig_len in 8..=payload.len().min(72) {
            let (arg, sig) = payload.split_at(payload.len() - sig_len);
            if sig[0] != 0x30 || sig[1] as usize != sig_len - 2 {
                continue;
            }

            let sig = match ecdsa::Signature::from_der(sig) {
                Ok(s) => s,
                Err(_) => continue,
            };

            let m = Message::from_digest(command.signature_digest(arg, &nonce));
            if self.secp.verify_ecdsa(&m, &sig, &self.app_key).is_ok() {
                trace!("Command signature verified ({sig_len} bytes)");
                return Ok(arg.to_vec());
            }
        }

        warn!("Command signature rejected");
        Err(Status::SecurityStatus)
    }

    fn sign_input(&mut self, arg: Vec<u8>) -> Result<Vec<u8>, Status> {
        if arg.len() < PATH_LEN || arg[0] != PATH_PREFIX || arg[1] != PATH_TYPE_BIP32 {
            return Err(Status::WrongData);
        }

        let element = |i: usize| {
            let o = 2 + i * 4;
            u32::from_be_bytes([arg[o], arg[o + 1], arg[o + 2], arg[o + 3]])
        };

        let req = InputRequest {
            index: self.inputs.len(),
            purpose: element(0) & !HARDENED,
            address_index: element(4),
            argument: arg.clone(),
        };

        let signer = self.signer.as_mut().ok_or(Status::Internal)?;
        let raw = signer(&req);

        let key = self.session_key.as_ref().ok_or(Status::Internal)?;
        let encrypted = encrypt(&raw, key);

        self.inputs.push(arg);
        self.state = DeviceState::Inputs;

        Ok(encrypted)
    }

    fn reset(&mut self) {
        self.state = DeviceState::Idle;
        self.nonce = None;
        self.session_key = None;
        self.fragments.clear();
        self.fragment_count = 0;
    }
}
