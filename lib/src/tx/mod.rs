// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction signing flow
//!
//! A [SigningFlow] drives the device through a strictly sequential session:
//!
//! ```text
//! Idle -> ScriptSent -> ArgumentSent -> InputsExecuting
//!      -> Finished -> Confirmed -> Decrypted -> Cleared
//! ```
//!
//! Per-input arguments are only issued once both the script and global
//! argument are accepted, one at a time and in input order. A rejected
//! confirmation ends the flow with [FlowOutcome::Cancelled]. Whatever the
//! outcome [SigningFlow::run] clears the transaction and powers off the
//! device before returning.

use log::{debug, warn};
use strum::Display;
use tokio::sync::OwnedMutexGuard;

use seal_apdu::Transport;
use seal_core::signature::decrypt;

use crate::{config::DeviceScript, DeviceSession, Error};

/// Signing flow state
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum TxState {
    Idle,
    ScriptSent,
    ArgumentSent,
    InputsExecuting,
    Finished,
    Confirmed,
    Decrypted,
    Cleared,
}

/// Result of the on-device confirmation step
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum Confirmation {
    Confirmed,
    Cancelled,
}

/// Terminal outcome of a [SigningFlow]
#[derive(Clone, PartialEq)]
pub enum FlowOutcome {
    /// Decrypted raw signatures, in input order
    Signed(Vec<Vec<u8>>),
    /// User rejected the transaction on the device
    Cancelled,
}

impl core::fmt::Debug for FlowOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Signed(s) => write!(f, "Signed({} signatures)", s.len()),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Handle to a device session configured for transaction signing
///
/// See [DeviceSession::signing_flow] to create a [SigningFlow]. Only one
/// flow may exist per session at a time.
pub struct SigningFlow<T: Transport> {
    session: DeviceSession<T>,
    state: TxState,
    /// Encrypted signatures, collected positionally
    encrypted: Vec<Vec<u8>>,
    _guard: OwnedMutexGuard<()>,
}

impl<T: Transport + Send> SigningFlow<T> {
    pub(crate) fn new(session: DeviceSession<T>, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            session,
            state: TxState::Idle,
            encrypted: vec![],
            _guard: guard,
        }
    }

    /// Fetch current flow state
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Load the signing script
    pub async fn send_script(&mut self, script: &DeviceScript) -> Result<(), Error> {
        check_state(self.state, TxState::Idle)?;

        self.session.send_script(script).await?;
        self.transition(TxState::ScriptSent);

        Ok(())
    }

    /// Execute the transaction-level argument
    pub async fn send_argument(&mut self, argument: &[u8]) -> Result<(), Error> {
        check_state(self.state, TxState::ScriptSent)?;

        self.session.send_argument(argument).await?;
        self.transition(TxState::ArgumentSent);

        Ok(())
    }

    /// Execute the next per-input argument, returning its position
    pub async fn execute_input(&mut self, argument: &[u8]) -> Result<usize, Error> {
        match self.state {
            TxState::ArgumentSent | TxState::InputsExecuting => (),
            s => return Err(Error::InvalidState(s, TxState::ArgumentSent)),
        }

        let index = self.encrypted.len();
        debug!("Executing input {index}");

        let sig = self.session.execute_utxo_input(argument).await?;
        self.encrypted.push(sig);
        self.transition(TxState::InputsExecuting);

        Ok(index)
    }

    /// Complete transaction preparation
    pub async fn finish(&mut self) -> Result<(), Error> {
        check_state(self.state, TxState::InputsExecuting)?;

        self.session.finish().await?;
        self.transition(TxState::Finished);

        Ok(())
    }

    /// Await user acknowledgement on the device
    pub async fn confirm(&mut self) -> Result<Confirmation, Error> {
        check_state(self.state, TxState::Finished)?;

        match self.session.confirm_on_device().await? {
            true => {
                self.transition(TxState::Confirmed);
                Ok(Confirmation::Confirmed)
            }
            false => {
                debug!("Transaction cancelled by user");
                Ok(Confirmation::Cancelled)
            }
        }
    }

    /// Fetch the session key and decrypt collected signatures
    pub async fn decrypt(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        check_state(self.state, TxState::Confirmed)?;

        let key = self.session.fetch_decryption_key().await?;

        let signatures = self
            .encrypted
            .iter()
            .map(|s| decrypt(s, &key))
            .collect::<Result<Vec<_>, _>>()?;

        self.transition(TxState::Decrypted);

        Ok(signatures)
    }

    /// Clear device transaction memory and power off
    pub async fn clear(&mut self) -> Result<(), Error> {
        let cleared = self.session.clear().await;
        let powered_off = self.session.power_off().await;

        self.encrypted.clear();
        self.transition(TxState::Cleared);

        cleared.and(powered_off)
    }

    /// Run the complete flow for a script, global argument and per-input arguments.
    ///
    /// Cleanup is best-effort and always attempted, the flow result takes
    /// precedence over cleanup failures.
    pub async fn run(
        mut self,
        script: &DeviceScript,
        argument: &[u8],
        inputs: &[Vec<u8>],
    ) -> Result<FlowOutcome, Error> {
        let r = self.execute(script, argument, inputs).await;

        if let Err(e) = self.clear().await {
            warn!("Device cleanup failed: {e}");
        }

        r
    }

    async fn execute(
        &mut self,
        script: &DeviceScript,
        argument: &[u8],
        inputs: &[Vec<u8>],
    ) -> Result<FlowOutcome, Error> {
        self.send_script(script).await?;
        self.send_argument(argument).await?;

        for i in inputs {
            self.execute_input(i).await?;
        }

        self.finish().await?;

        if self.confirm().await? == Confirmation::Cancelled {
            return Ok(FlowOutcome::Cancelled);
        }

        let signatures = self.decrypt().await?;

        Ok(FlowOutcome::Signed(signatures))
    }

    fn transition(&mut self, next: TxState) {
        debug!("Signing state {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Helper to check state when executing transactions
pub(crate) fn check_state(actual: TxState, expected: TxState) -> Result<(), Error> {
    if actual != expected {
        Err(Error::InvalidState(actual, expected))
    } else {
        Ok(())
    }
}
