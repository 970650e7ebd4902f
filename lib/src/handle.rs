// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Handle for connected secure elements
//!
//! This provides the primitive device operations used by the
//! [SigningFlow][crate::tx::SigningFlow] and is generic over
//! [Transport] to support different underlying links / simulators

use std::{sync::Arc, time::Duration};

use bitcoin::secp256k1::{Message, Secp256k1, SecretKey, SignOnly};
use log::{debug, trace};
use rand_core::OsRng;
use tokio::sync::Mutex;

use seal_apdu::{Command, Frame, Response, SecureChannel, Status, Transport};
use seal_core::signature::SessionKey;

use crate::{config::DeviceScript, tx::SigningFlow, Error, SignerConfig};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_S: u64 = 10;

/// Default timeout for requests awaiting user confirmation
pub const DEFAULT_USER_TIMEOUT_S: u64 = 60;

/// Default payload size above which the secure channel is used
pub const DEFAULT_SECURE_THRESHOLD: usize = seal_apdu::frame::MAX_PAYLOAD;

/// Session handle for a connected secure element.
///
/// This is generic over [Transport] types to support different
/// underlying transports. Clones share the same transport and flow lock.
pub struct DeviceSession<T: Transport> {
    /// Transport for device communication
    t: Arc<Mutex<T>>,
    /// Held for the lifetime of a [SigningFlow]
    flow: Arc<Mutex<()>>,
    /// Application key for command signing
    app_key: SecretKey,
    secp: Secp256k1<SignOnly>,
    channel: SecureChannel,
    /// Timeout for APDU requests
    request_timeout_s: u64,
    /// Timeout for user acknowledgements
    user_timeout_s: u64,
    /// Payloads above this length use the secure channel
    secure_threshold: usize,
}

impl<T: Transport> Clone for DeviceSession<T> {
    fn clone(&self) -> Self {
        Self {
            t: self.t.clone(),
            flow: self.flow.clone(),
            app_key: self.app_key,
            secp: self.secp.clone(),
            channel: self.channel,
            request_timeout_s: self.request_timeout_s,
            user_timeout_s: self.user_timeout_s,
            secure_threshold: self.secure_threshold,
        }
    }
}

impl<T: Transport + Send> DeviceSession<T> {
    /// Create a session over the provided transport using the
    /// application's registered key for command signing
    pub fn new(t: T, app_key: SecretKey) -> Self {
        Self {
            t: Arc::new(Mutex::new(t)),
            flow: Arc::new(Mutex::new(())),
            app_key,
            secp: Secp256k1::signing_only(),
            channel: SecureChannel::default(),
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
            user_timeout_s: DEFAULT_USER_TIMEOUT_S,
            secure_threshold: DEFAULT_SECURE_THRESHOLD,
        }
    }

    /// Apply timeouts and channel threshold from a [SignerConfig]
    pub fn with_config(mut self, c: &SignerConfig) -> Self {
        self.request_timeout_s = c.request_timeout_s;
        self.user_timeout_s = c.user_timeout_s;
        self.secure_threshold = c.secure_channel_threshold;
        self
    }

    /// Override the per-request timeout
    pub fn with_request_timeout(mut self, timeout_s: u64) -> Self {
        self.request_timeout_s = timeout_s;
        self
    }

    /// Override the secure channel threshold
    pub fn with_secure_threshold(mut self, threshold: usize) -> Self {
        self.secure_threshold = threshold;
        self
    }

    /// Helper to fetch APDU request timeout
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_s)
    }

    /// Helper to fetch user interaction timeout
    fn user_timeout(&self) -> Duration {
        Duration::from_secs(self.user_timeout_s)
    }

    /// Start a [SigningFlow], waiting for any in-flight flow to complete
    pub async fn signing_flow(&self) -> SigningFlow<T> {
        let guard = self.flow.clone().lock_owned().await;
        SigningFlow::new(self.clone(), guard)
    }

    /// Exchange a single plain frame with the device, returning output data
    pub async fn exchange(&self, command: Command, payload: &[u8]) -> Result<Vec<u8>, Error> {
        self.exchange_timeout(command, payload, self.request_timeout())
            .await
    }

    async fn exchange_timeout(
        &self,
        command: Command,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        let frame = Frame::encode(&command, payload)?;
        let header = frame.header_bytes()?;

        trace!("request {command}: {} bytes", payload.len());

        // Execute exchange with timeout
        let raw = {
            let mut t = self.t.lock().await;
            match tokio::time::timeout(timeout, t.request(&header, &frame.data)).await {
                Ok(Ok(v)) => v,
                Ok(Err(e)) => return Err(Error::Transport(anyhow::Error::new(e))),
                Err(_e) => return Err(Error::RequestTimeout),
            }
        };

        let resp = Response::decode(&raw, command.target)?;
        if !resp.is_success() {
            debug!("{command} failed with status {:04x}", resp.status);
            return Err(Error::from_status(resp.status));
        }

        Ok(resp.data)
    }

    /// Transfer a command over the secure channel, returning verified output data
    pub async fn exchange_secure(
        &self,
        command: Command,
        payload: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let sealed = self.channel.seal(&command, payload, &mut OsRng)?;

        debug!(
            "secure transfer {command}: {} fragments",
            sealed.fragment_count()
        );

        // Fragments are strictly sequential, any failure aborts the transfer
        let mut last = vec![];
        for (c, data) in sealed.fragments() {
            last = self.exchange(c, data).await?;
        }

        let output = sealed.open_response(&last)?;

        Ok(output)
    }

    /// Execute a command, using the secure channel for sensitive or oversized payloads
    pub async fn execute(
        &self,
        command: Command,
        payload: &[u8],
        sensitive: bool,
    ) -> Result<Vec<u8>, Error> {
        match sensitive || payload.len() > self.secure_threshold {
            true => self.exchange_secure(command, payload).await,
            false => self.exchange(command, payload).await,
        }
    }

    /// Sign a command payload with the application key against a device nonce,
    /// returning `payload ‖ DER(signature)`
    fn sign_command(&self, command: &Command, payload: &[u8], nonce: &[u8]) -> Vec<u8> {
        let digest = command.signature_digest(payload, nonce);
        let sig = self
            .secp
            .sign_ecdsa(&Message::from_digest(digest), &self.app_key);

        let mut b = payload.to_vec();
        b.extend_from_slice(&sig.serialize_der());
        b
    }

    /// Execute a signed command, fetching a fresh nonce immediately before signing
    pub async fn execute_signed(&self, command: Command, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = self.nonce().await?;
        let signed = self.sign_command(&command, payload, &nonce);

        self.execute(command, &signed, false).await
    }

    /// Fetch the secure element firmware version
    pub async fn se_version(&self) -> Result<u32, Error> {
        let r = self.exchange(Command::GET_SE_VERSION, &[]).await?;

        if r.is_empty() || r.len() > 4 {
            return Err(Error::UnexpectedResponse);
        }

        let v = r.iter().fold(0u32, |a, b| (a << 8) | *b as u32);

        debug!("SE version: {v}");

        Ok(v)
    }

    /// Fetch a single-use command signing nonce
    pub async fn nonce(&self) -> Result<Vec<u8>, Error> {
        let n = self.exchange(Command::GET_NONCE, &[]).await?;

        if n.is_empty() {
            return Err(Error::UnexpectedResponse);
        }

        Ok(n)
    }

    /// Load a signing script (`bytecode ‖ signature`)
    pub async fn send_script(&self, script: &DeviceScript) -> Result<(), Error> {
        debug!("Sending script ({} bytes)", script.bytecode.len());

        let payload = [&script.bytecode[..], &script.signature[..]].concat();
        self.execute(Command::SEND_SCRIPT, &payload, false).await?;

        Ok(())
    }

    /// Execute the transaction-level argument
    pub async fn send_argument(&self, argument: &[u8]) -> Result<(), Error> {
        debug!("Sending argument ({} bytes)", argument.len());

        self.execute_signed(Command::EXECUTE_SCRIPT, argument)
            .await?;

        Ok(())
    }

    /// Execute a per-input argument, returning the encrypted input signature
    pub async fn execute_utxo_input(&self, argument: &[u8]) -> Result<Vec<u8>, Error> {
        let r = self
            .execute_signed(Command::EXECUTE_UTXO, argument)
            .await?;

        if r.is_empty() {
            return Err(Error::UnexpectedResponse);
        }

        Ok(r)
    }

    /// Complete transaction preparation
    pub async fn finish(&self) -> Result<(), Error> {
        self.exchange(Command::FINISH_PREPARE, &[]).await?;
        Ok(())
    }

    /// Display the transaction and await user acknowledgement.
    ///
    /// Returns `false` where the user rejected the transaction.
    pub async fn confirm_on_device(&self) -> Result<bool, Error> {
        debug!("Awaiting user confirmation");

        match self
            .exchange_timeout(Command::GET_TX_DETAIL, &[], self.user_timeout())
            .await
        {
            Ok(_) => Ok(true),
            Err(Error::Device(Status::UserCancelled)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetch the single-use signature decryption key (always via the secure channel)
    pub async fn fetch_decryption_key(&self) -> Result<SessionKey, Error> {
        let r = self.execute(Command::GET_TX_KEY, &[], true).await?;

        let k = SessionKey::from_slice(&r)?;

        Ok(k)
    }

    /// Clear device transaction memory
    pub async fn clear(&self) -> Result<(), Error> {
        self.exchange(Command::CLEAR_TX, &[]).await?;
        Ok(())
    }

    /// Power off the device
    pub async fn power_off(&self) -> Result<(), Error> {
        self.exchange(Command::POWER_OFF, &[]).await?;
        Ok(())
    }
}
