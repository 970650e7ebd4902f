// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Public key resolution
//!
//! Inputs and change must carry resolved public keys before a transaction
//! is prepared. Keys come from a [KeyProvider], typically an
//! [AccountKeyCache] fetching one account-level xpub per derivation purpose
//! and deriving `0/address_index` children locally.

use std::collections::HashMap;

use async_trait::async_trait;
use bitcoin::{
    bip32::{ChildNumber, Xpub},
    secp256k1::{PublicKey, Secp256k1, VerifyOnly},
};
use log::debug;
use tokio::sync::Mutex;

use seal_core::{Change, Input, ScriptType};

use crate::Error;

/// Resolves compressed public keys by address index and purpose
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn public_key(&self, address_index: u32, purpose: u32) -> Result<PublicKey, Error>;
}

/// Source of account-level (`m / purpose' / 0' / 0'`) extended public keys
#[async_trait]
pub trait AccountKeySource: Send + Sync {
    async fn account_xpub(&self, purpose: u32) -> anyhow::Result<Xpub>;
}

/// [KeyProvider] caching one account xpub per purpose
pub struct AccountKeyCache<S: AccountKeySource> {
    source: S,
    cache: Mutex<HashMap<u32, Xpub>>,
    secp: Secp256k1<VerifyOnly>,
}

impl<S: AccountKeySource> AccountKeyCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
            secp: Secp256k1::verification_only(),
        }
    }

    /// Fetch the account xpub for a purpose, querying the source on first use
    pub async fn account_xpub(&self, purpose: u32) -> Result<Xpub, Error> {
        let mut cache = self.cache.lock().await;

        if let Some(x) = cache.get(&purpose) {
            return Ok(*x);
        }

        debug!("Fetching account key for purpose {purpose}");

        let x = self
            .source
            .account_xpub(purpose)
            .await
            .map_err(Error::KeyProvider)?;
        cache.insert(purpose, x);

        Ok(x)
    }

    /// Drop cached account keys
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }
}

#[async_trait]
impl<S: AccountKeySource> KeyProvider for AccountKeyCache<S> {
    async fn public_key(&self, address_index: u32, purpose: u32) -> Result<PublicKey, Error> {
        let account = self.account_xpub(purpose).await?;

        let path = [
            ChildNumber::from_normal_idx(0),
            ChildNumber::from_normal_idx(address_index),
        ]
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::KeyProvider(e.into()))?;

        let child = account
            .derive_pub(&self.secp, &path)
            .map_err(|e| Error::KeyProvider(e.into()))?;

        Ok(child.public_key)
    }
}

/// Resolve missing input and change keys for the provided script type
pub async fn resolve_keys<K: KeyProvider + ?Sized>(
    keys: &K,
    script_type: ScriptType,
    inputs: &mut [Input],
    change: Option<&mut Change>,
) -> Result<(), Error> {
    for i in inputs.iter_mut().filter(|i| i.pubkey.is_none()) {
        let purpose = i.purpose.unwrap_or_else(|| script_type.default_purpose());
        i.pubkey = Some(keys.public_key(i.address_index, purpose).await?);
    }

    if let Some(c) = change.filter(|c| c.pubkey.is_none()) {
        let purpose = c.purpose.unwrap_or_else(|| script_type.default_purpose());
        c.pubkey = Some(keys.public_key(c.address_index, purpose).await?);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::{
        str::FromStr,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    const BIP84_XPUB: &str = "xpub6CatWdiZiodmUeTDp8LT5or8nmbKNcuyvz7WyksVFkKB4RHwCD3XyuvPEbvqAQY3rAPshWcMLoP2fMFMKHPJ4ZeZXYVUhLv1VMrjPC7PW6V";

    struct Source {
        count: AtomicUsize,
    }

    #[async_trait]
    impl AccountKeySource for Source {
        async fn account_xpub(&self, purpose: u32) -> anyhow::Result<Xpub> {
            self.count.fetch_add(1, Ordering::SeqCst);

            match purpose {
                84 => Ok(Xpub::from_str(BIP84_XPUB)?),
                _ => Err(anyhow::anyhow!("no account for purpose {purpose}")),
            }
        }
    }

    fn cache() -> AccountKeyCache<Source> {
        AccountKeyCache::new(Source {
            count: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn derive_bip84() {
        let c = cache();

        let k0 = c.public_key(0, 84).await.unwrap();
        let k1 = c.public_key(1, 84).await.unwrap();

        assert_eq!(
            k0.to_string(),
            "0330d54fd0dd420a6e5f8d3624f5f3482cae350f79d5f0753bf5beef9c2d91af3c"
        );
        assert_eq!(
            k1.to_string(),
            "03e775fd51f0dfb8cd865d9ff1cca2a158cf651fe997fdc9fee9c1d3b5e995ea77"
        );

        // Account key fetched once per purpose
        assert_eq!(c.source.count.load(Ordering::SeqCst), 1);

        c.clear().await;
        c.public_key(0, 84).await.unwrap();
        assert_eq!(c.source.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn source_errors() {
        let c = cache();

        assert!(matches!(c.public_key(0, 44).await, Err(Error::KeyProvider(_))));
        assert!(matches!(
            c.public_key(0x8000_0000, 84).await,
            Err(Error::KeyProvider(_))
        ));
    }

    #[tokio::test]
    async fn resolve_missing_keys() {
        let c = cache();

        let txid = bitcoin::Txid::from_str(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();

        let mut inputs = vec![Input::new(txid, 0, "1000", 1), Input::new(txid, 1, "1000", 0)];
        inputs[1].pubkey = Some(c.public_key(1, 84).await.unwrap());

        let mut change = Change::new(0, "500");

        resolve_keys(&c, ScriptType::P2wpkh, &mut inputs, Some(&mut change))
            .await
            .unwrap();

        assert_eq!(inputs[0].pubkey, Some(c.public_key(1, 84).await.unwrap()));
        // Pre-resolved keys are left untouched
        assert_eq!(inputs[1].pubkey, Some(c.public_key(1, 84).await.unwrap()));
        assert_eq!(change.pubkey, Some(c.public_key(0, 84).await.unwrap()));

        // Unknown purpose
        let mut inputs = vec![Input::new(txid, 0, "1000", 1)];
        assert!(
            resolve_keys(&c, ScriptType::P2pkh, &mut inputs, None)
                .await
                .is_err()
        );
    }
}
