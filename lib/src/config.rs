// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Signer configuration
//!
//! ```toml
//! network = "testnet"
//! request_timeout_s = 10
//! firmware = "taproot"
//!
//! [scripts.segwit]
//! bytecode = "03000002c9..."
//! signature = "3045022100..."
//! ```

use std::{fs, path::Path};

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use seal_apdu::frame::MAX_PAYLOAD;
use seal_core::argument::{ArgumentFamily, FirmwareGeneration};

use crate::{
    handle::{DEFAULT_REQUEST_TIMEOUT_S, DEFAULT_SECURE_THRESHOLD, DEFAULT_USER_TIMEOUT_S},
    Error,
};

/// Signer configuration, see [Signer][crate::Signer]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Network for address parsing and formatting
    #[serde(default = "default_network")]
    pub network: Network,

    /// Timeout for each device round-trip
    #[serde(default = "default_request_timeout_s")]
    pub request_timeout_s: u64,

    /// Timeout for the on-device confirmation step
    #[serde(default = "default_user_timeout_s")]
    pub user_timeout_s: u64,

    /// Pinned firmware generation, queried from the device when absent
    #[serde(default)]
    pub firmware: Option<FirmwareGeneration>,

    /// Payloads exceeding this length are sent over the secure channel
    #[serde(default = "default_secure_channel_threshold")]
    pub secure_channel_threshold: usize,

    /// Verify device signatures against locally computed sighashes
    #[serde(default = "default_verify_signatures")]
    pub verify_signatures: bool,

    /// Device scripts per argument family
    #[serde(default)]
    pub scripts: DeviceScripts,
}

fn default_network() -> Network {
    Network::Bitcoin
}

fn default_request_timeout_s() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_S
}

fn default_user_timeout_s() -> u64 {
    DEFAULT_USER_TIMEOUT_S
}

fn default_secure_channel_threshold() -> usize {
    DEFAULT_SECURE_THRESHOLD
}

fn default_verify_signatures() -> bool {
    true
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            request_timeout_s: default_request_timeout_s(),
            user_timeout_s: default_user_timeout_s(),
            firmware: None,
            secure_channel_threshold: default_secure_channel_threshold(),
            verify_signatures: default_verify_signatures(),
            scripts: DeviceScripts::default(),
        }
    }
}

impl SignerConfig {
    /// Parse and validate a TOML configuration
    pub fn from_toml(s: &str) -> Result<Self, Error> {
        let c: Self = toml::from_str(s)
            .map_err(|e| Error::Config(format!("unable to parse config: {e}")))?;

        c.validate()?;

        Ok(c)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let s = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("unable to read {}: {e}", path.display())))?;

        Self::from_toml(&s)
    }

    /// Check configured limits
    pub fn validate(&self) -> Result<(), Error> {
        if self.request_timeout_s == 0 || self.user_timeout_s == 0 {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }

        if self.secure_channel_threshold > MAX_PAYLOAD {
            return Err(Error::Config(format!(
                "secure channel threshold {} exceeds frame payload maximum ({MAX_PAYLOAD})",
                self.secure_channel_threshold
            )));
        }

        Ok(())
    }
}

/// Device script bytecode with the issuer's signature over it
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceScript {
    #[serde(with = "hex::serde")]
    pub bytecode: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

impl core::fmt::Debug for DeviceScript {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "DeviceScript({} bytes, {} byte signature)",
            self.bytecode.len(),
            self.signature.len()
        )
    }
}

/// Device scripts by argument family
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceScripts {
    #[serde(default)]
    pub legacy: Option<DeviceScript>,
    #[serde(default)]
    pub segwit: Option<DeviceScript>,
    #[serde(default)]
    pub taproot: Option<DeviceScript>,
}

impl DeviceScripts {
    /// Fetch the script executing arguments of the provided family
    pub fn script(&self, family: ArgumentFamily) -> Result<&DeviceScript, Error> {
        let s = match family {
            ArgumentFamily::Legacy => &self.legacy,
            ArgumentFamily::SegwitV0 => &self.segwit,
            ArgumentFamily::Taproot => &self.taproot,
        };

        s.as_ref().ok_or(Error::MissingScript(family))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let c = SignerConfig::from_toml("").unwrap();

        assert_eq!(c, SignerConfig::default());
        assert_eq!(c.network, Network::Bitcoin);
        assert_eq!(c.request_timeout_s, 10);
        assert_eq!(c.secure_channel_threshold, 250);
        assert!(c.verify_signatures);
        assert!(c.firmware.is_none());
    }

    #[test]
    fn parse_scripts() {
        let c = SignerConfig::from_toml(
            r#"
network = "testnet"
firmware = "segwit"
verify_signatures = false

[scripts.segwit]
bytecode = "0300aabb"
signature = "3044"
"#,
        )
        .unwrap();

        assert_eq!(c.network, Network::Testnet);
        assert_eq!(c.firmware, Some(FirmwareGeneration::Segwit));
        assert!(!c.verify_signatures);

        let s = c.scripts.script(ArgumentFamily::SegwitV0).unwrap();
        assert_eq!(s.bytecode, vec![0x03, 0x00, 0xaa, 0xbb]);
        assert_eq!(s.signature, vec![0x30, 0x44]);

        assert!(matches!(
            c.scripts.script(ArgumentFamily::Taproot),
            Err(Error::MissingScript(ArgumentFamily::Taproot))
        ));
    }

    #[test]
    fn reject_invalid() {
        assert!(matches!(
            SignerConfig::from_toml("secure_channel_threshold = 251"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SignerConfig::from_toml("request_timeout_s = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SignerConfig::from_toml("firmware = \"quantum\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SignerConfig::from_toml("[scripts.legacy]\nbytecode = \"zz\"\nsignature = \"\""),
            Err(Error::Config(_))
        ));
    }
}
