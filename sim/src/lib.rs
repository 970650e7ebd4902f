// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Software secure element simulator
//!
//! [Simulator] implements [Transport] over an in-memory device enforcing
//! the command protocol (script -> argument -> inputs -> finish ordering,
//! single-use nonces, command signatures, secure channel integrity) and
//! returning AES encrypted input signatures. Clones share device state so
//! tests can inspect the command log after a flow completes.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bitcoin::secp256k1::PublicKey;
use log::debug;

use seal_apdu::{Instruction, Status, Transport};

mod device;
pub use device::{DeviceState, InputRequest, SignFn, NONCE_LEN};
use device::Device;

mod wallet;
pub use wallet::Wallet;

/// Default simulated SE version (taproot capable)
pub const DEFAULT_SE_VERSION: u32 = 331;

/// Simulator transport errors
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SimError {
    /// Simulated link failure
    #[error("simulator disconnected")]
    Disconnected,

    /// Device state lock poisoned
    #[error("simulator state poisoned")]
    Poisoned,
}

/// Simulated secure element
#[derive(Clone)]
pub struct Simulator {
    device: Arc<Mutex<Device>>,
    delay: Option<Duration>,
    disconnected: bool,
}

impl Simulator {
    /// Create a simulator accepting commands signed by the registered app key
    pub fn new(app_key: PublicKey) -> Self {
        Self {
            device: Arc::new(Mutex::new(Device::new(app_key, DEFAULT_SE_VERSION))),
            delay: None,
            disconnected: false,
        }
    }

    fn with_device<R>(&self, f: impl FnOnce(&mut Device) -> R) -> R {
        let mut d = match self.device.lock() {
            Ok(d) => d,
            Err(p) => p.into_inner(),
        };
        f(&mut d)
    }

    /// Set the reported SE version
    pub fn with_se_version(self, v: u32) -> Self {
        self.with_device(|d| d.se_version = v);
        self
    }

    /// Set the callback producing raw input signatures
    pub fn with_signer(self, f: impl FnMut(&InputRequest) -> Vec<u8> + Send + 'static) -> Self {
        self.with_device(|d| d.signer = Some(Box::new(f)));
        self
    }

    /// Reject the on-device confirmation
    pub fn reject_confirmation(self) -> Self {
        self.with_device(|d| d.reject_confirmation = true);
        self
    }

    /// Fail an instruction with the provided status
    pub fn fail_on(self, i: Instruction, s: Status) -> Self {
        self.with_device(|d| d.faults.insert(i as u8, s));
        self
    }

    /// Echo a modified salt in secure channel responses
    pub fn corrupt_salt(self) -> Self {
        self.with_device(|d| d.corrupt_salt = true);
        self
    }

    /// Delay every response
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every request at the transport level
    pub fn disconnect(mut self) -> Self {
        self.disconnected = true;
        self
    }

    /// Logical instructions received, in order
    pub fn log(&self) -> Vec<Instruction> {
        self.with_device(|d| d.log.iter().map(|(i, _)| *i).collect())
    }

    /// Logical instructions received over the secure channel, in order
    pub fn secure_log(&self) -> Vec<Instruction> {
        self.with_device(|d| d.log.iter().filter(|(_, s)| *s).map(|(i, _)| *i).collect())
    }

    /// Secure channel fragments received
    pub fn fragments_received(&self) -> usize {
        self.with_device(|d| d.fragments_received)
    }

    /// Current device transaction state
    pub fn state(&self) -> DeviceState {
        self.with_device(|d| d.state)
    }

    /// Last loaded script
    pub fn script(&self) -> Option<Vec<u8>> {
        self.with_device(|d| d.script.clone())
    }

    /// Last executed global argument
    pub fn argument(&self) -> Option<Vec<u8>> {
        self.with_device(|d| d.argument.clone())
    }

    /// Executed per-input arguments
    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.with_device(|d| d.inputs.clone())
    }

    /// Number of clear commands received
    pub fn cleared(&self) -> usize {
        self.with_device(|d| d.cleared)
    }

    /// Number of power off commands received
    pub fn powered_off(&self) -> usize {
        self.with_device(|d| d.powered_off)
    }

    fn handle(&self, command: &[u8], data: &[u8]) -> Result<Vec<u8>, SimError> {
        if self.disconnected {
            return Err(SimError::Disconnected);
        }

        let mut d = self.device.lock().map_err(|_| SimError::Poisoned)?;
        Ok(d.handle(command, data))
    }
}

#[async_trait]
impl Transport for Simulator {
    type Error = SimError;

    async fn request(&mut self, command: &[u8], data: &[u8]) -> Result<Vec<u8>, SimError> {
        if let Some(d) = self.delay {
            debug!("Delaying response by {d:?}");
            tokio::time::sleep(d).await;
        }

        self.handle(command, data)
    }
}
