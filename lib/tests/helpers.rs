// Copyright (c) 2022-2023 The MobileCoin Foundation

#![allow(dead_code)]

use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::{
    bip32::Xpub,
    secp256k1::{PublicKey, Secp256k1, SecretKey},
    Network, Txid,
};
use log::LevelFilter;
use simplelog::SimpleLogger;

use seal::{
    apdu::Instruction,
    engine::{
        argument::FirmwareGeneration, prepare::PreparedData, script::pubkey_to_address_and_script,
        sighash,
    },
    AccountKeyCache, AccountKeySource, DeviceScript, DeviceScripts, DeviceSession, Input, Output,
    ScriptType, SignRequest, Signer, SignerConfig,
};
use seal_sim::{Simulator, Wallet};

pub const SEED: [u8; 32] = [0x5e; 32];

pub const APP_KEY: [u8; 32] = [0x11; 32];

/// Taproot script exceeds a single frame, exercising the secure channel
pub const TAPROOT_SCRIPT_LEN: usize = 300;

/// Account key source backed by the simulator wallet
pub struct WalletKeys(pub Wallet);

#[async_trait]
impl AccountKeySource for WalletKeys {
    async fn account_xpub(&self, purpose: u32) -> anyhow::Result<Xpub> {
        self.0.account_xpub(purpose)
    }
}

pub type TestSigner = Signer<Simulator, AccountKeyCache<WalletKeys>>;

pub struct Harness {
    pub sim: Simulator,
    pub signer: TestSigner,
    pub wallet: Wallet,
}

/// Setup logging for tests
pub fn setup_logging() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let log_cfg = simplelog::ConfigBuilder::new().build();

    let _ = SimpleLogger::init(log_level, log_cfg);
}

pub fn app_key() -> SecretKey {
    SecretKey::from_slice(&APP_KEY).unwrap()
}

pub fn wallet() -> Wallet {
    Wallet::from_seed(&SEED).unwrap()
}

/// Device scripts for each argument family
pub fn scripts() -> DeviceScripts {
    let script = |tag: u8, len: usize| DeviceScript {
        bytecode: vec![tag; len],
        signature: vec![0x30, 0x06, 0x02, 0x01, tag, 0x02, 0x01, tag],
    };

    DeviceScripts {
        legacy: Some(script(0x01, 64)),
        segwit: Some(script(0x02, 96)),
        taproot: Some(script(0x03, TAPROOT_SCRIPT_LEN)),
    }
}

pub fn config(firmware: Option<FirmwareGeneration>) -> SignerConfig {
    SignerConfig {
        firmware,
        scripts: scripts(),
        ..Default::default()
    }
}

/// Setup a simulator and signer
pub fn setup(config: SignerConfig) -> Harness {
    setup_with(Simulator::new(app_public()), config)
}

/// Setup a signer over the provided simulator
pub fn setup_with(sim: Simulator, config: SignerConfig) -> Harness {
    setup_logging();

    let session = DeviceSession::new(sim.clone(), app_key());
    let keys = AccountKeyCache::new(WalletKeys(wallet()));

    Harness {
        sim,
        signer: Signer::new(session, keys, config).unwrap(),
        wallet: wallet(),
    }
}

pub fn app_public() -> PublicKey {
    PublicKey::from_secret_key(&Secp256k1::new(), &app_key())
}

impl Harness {
    /// Prepare the request and install a simulator signer producing
    /// signatures over the expected sighashes
    pub async fn arm(&self, req: &SignRequest) -> PreparedData {
        self.arm_with(req, self.wallet.clone()).await
    }

    pub async fn arm_with(&self, req: &SignRequest, wallet: Wallet) -> PreparedData {
        let data = self.signer.prepare(req.clone()).await.unwrap();

        let sighashes = (0..data.inputs.len())
            .map(|i| sighash::sighash(&data, i))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let script_type = data.script_type;

        let _ = self.sim.clone().with_signer(move |r| {
            wallet
                .sign(script_type, r.purpose, r.address_index, sighashes[r.index])
                .unwrap()
        });

        data
    }
}

pub fn txid(n: u8) -> Txid {
    Txid::from_str(&format!("{:02x}", n).repeat(32)).unwrap()
}

/// Address paying to a wallet key (external account, index offset)
pub fn address(script_type: ScriptType, index: u32) -> String {
    let pk = wallet()
        .public_key(script_type.default_purpose(), 1000 + index)
        .unwrap();

    pubkey_to_address_and_script(&pk, script_type, Network::Bitcoin)
        .unwrap()
        .0
}

/// Build a request spending `n` inputs with change
pub fn request(script_type: ScriptType, n: usize) -> SignRequest {
    let inputs = (0..n)
        .map(|i| Input::new(txid(i as u8 + 1), i as u32, "50000", i as u32))
        .collect();

    SignRequest::new(inputs, Output::new(&address(script_type, 0), "12345"), script_type)
        .change(seal::Change::new(7, "30000"))
}

/// Check each signed command is immediately preceded by a nonce request
pub fn assert_nonce_precedes(log: &[Instruction]) {
    for (i, c) in log.iter().enumerate() {
        if matches!(c, Instruction::ExecuteScript | Instruction::ExecuteUtxo) {
            assert!(
                i > 0 && log[i - 1] == Instruction::GetNonce,
                "signed command at {i} without nonce: {log:?}"
            );
        }
    }
}
