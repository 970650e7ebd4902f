// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction signing facade
//!
//! Everything up to argument encoding (key resolution, preparation, strategy
//! selection) completes before the [SigningFlow][crate::tx::SigningFlow]
//! issues its first command, so input and script type errors never reach
//! the device.

use log::{debug, info};

use seal_apdu::Transport;
use seal_core::{
    argument::{self, FirmwareGeneration},
    compose,
    prepare::{PreparedData, UnsignedTxBuilder, DEFAULT_VERSION},
    sighash,
    signature::{post_process, ProcessedSignature},
    Change, Input, Output, ScriptType,
};

use crate::{
    keys::{resolve_keys, KeyProvider},
    tx::FlowOutcome,
    DeviceSession, Error, SignerConfig,
};

/// Transaction signing request
#[derive(Clone, Debug, PartialEq)]
pub struct SignRequest {
    pub inputs: Vec<Input>,
    pub output: Output,
    pub change: Option<Change>,
    /// Script type shared by all inputs and change
    pub script_type: ScriptType,
    /// Transaction version, defaults to [DEFAULT_VERSION]
    pub version: Option<u32>,
    pub locktime: u32,
    /// OP_RETURN extension output data
    pub extension: Option<Vec<u8>>,
}

impl SignRequest {
    pub fn new(inputs: Vec<Input>, output: Output, script_type: ScriptType) -> Self {
        Self {
            inputs,
            output,
            change: None,
            script_type,
            version: None,
            locktime: 0,
            extension: None,
        }
    }

    pub fn change(mut self, change: Change) -> Self {
        self.change = Some(change);
        self
    }

    pub fn extension(mut self, data: &[u8]) -> Self {
        self.extension = Some(data.to_vec());
        self
    }
}

/// Signing outcome
#[derive(Clone, Debug, PartialEq)]
pub enum SignOutcome {
    /// Fully signed transaction, hex encoded
    Signed { tx_hex: String },
    /// User rejected the transaction on the device
    Cancelled,
}

/// Signs transactions using a connected device
pub struct Signer<T: Transport, K: KeyProvider> {
    session: DeviceSession<T>,
    keys: K,
    config: SignerConfig,
}

impl<T: Transport + Send, K: KeyProvider> Signer<T, K> {
    /// Create a signer, applying session timeouts from the configuration
    pub fn new(session: DeviceSession<T>, keys: K, config: SignerConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            session: session.with_config(&config),
            keys,
            config,
        })
    }

    /// Fetch the underlying device session
    pub fn session(&self) -> &DeviceSession<T> {
        &self.session
    }

    /// Fetch the signer configuration
    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// Sign a transaction spending `inputs` to `output` with optional `change`
    pub async fn sign_transaction(
        &self,
        inputs: Vec<Input>,
        output: Output,
        change: Option<Change>,
        script_type: ScriptType,
        version: Option<u32>,
    ) -> Result<SignOutcome, Error> {
        let req = SignRequest {
            change,
            version,
            ..SignRequest::new(inputs, output, script_type)
        };

        self.sign(req).await
    }

    /// Resolve keys and build the immutable transaction snapshot
    pub async fn prepare(&self, req: SignRequest) -> Result<PreparedData, Error> {
        let SignRequest {
            mut inputs,
            output,
            mut change,
            script_type,
            version,
            locktime,
            extension,
        } = req;

        resolve_keys(&self.keys, script_type, &mut inputs, change.as_mut()).await?;

        let mut b = UnsignedTxBuilder::new(script_type, self.config.network)
            .version(version.unwrap_or(DEFAULT_VERSION))
            .locktime(locktime)
            .inputs(inputs)
            .output(output)
            .change(change);

        if let Some(e) = &extension {
            b = b.extension(e);
        }

        let data = b.build()?;

        Ok(data)
    }

    /// Resolve the device firmware generation, using the configured pin where set.
    ///
    /// [Signer::sign] calls this while holding the session's flow lock.
    pub async fn firmware(&self) -> Result<FirmwareGeneration, Error> {
        match self.config.firmware {
            Some(g) => Ok(g),
            None => {
                let v = self.session.se_version().await?;
                Ok(FirmwareGeneration::from_se_version(v))
            }
        }
    }

    /// Sign a transaction request
    pub async fn sign(&self, req: SignRequest) -> Result<SignOutcome, Error> {
        let data = self.prepare(req).await?;

        // Version queries must not interleave with another in-flight flow
        let flow = self.session.signing_flow().await;

        let generation = self.firmware().await?;
        let strategy = argument::select(generation, data.script_type)?;
        let script = self.config.scripts.script(strategy.family())?;

        let global = strategy.encode_global(&data)?;
        let inputs = strategy.encode_inputs(&data)?;

        info!(
            "Signing {} input {} transaction ({} firmware, {} arguments)",
            data.inputs.len(),
            data.script_type,
            generation,
            strategy.family()
        );

        let raw = match flow.run(script, &global, &inputs).await? {
            FlowOutcome::Signed(s) => s,
            FlowOutcome::Cancelled => return Ok(SignOutcome::Cancelled),
        };

        if raw.len() != data.inputs.len() {
            return Err(seal_core::Error::SignatureCount {
                expected: data.inputs.len(),
                actual: raw.len(),
            }
            .into());
        }

        let signatures = raw
            .iter()
            .map(|r| post_process(r, data.script_type))
            .collect::<Result<Vec<_>, _>>()?;

        if self.config.verify_signatures {
            verify_signatures(&data, &signatures)?;
        }

        let tx_hex = compose::compose_hex(&data, &signatures)?;

        debug!("Signed transaction: {tx_hex}");

        Ok(SignOutcome::Signed { tx_hex })
    }
}

/// Verify post-processed signatures against locally computed sighashes
pub fn verify_signatures(
    data: &PreparedData,
    signatures: &[ProcessedSignature],
) -> Result<(), Error> {
    for (i, s) in signatures.iter().enumerate() {
        if !sighash::verify(data, i, s)? {
            return Err(Error::SignatureMismatch(i));
        }
    }

    Ok(())
}
