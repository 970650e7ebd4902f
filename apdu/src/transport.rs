// Copyright (c) 2022-2023 The MobileCoin Foundation

use async_trait::async_trait;

/// Request / response transport to a secure element.
///
/// Implementations carry an encoded frame header and frame data to the device
/// and return the raw response (status word included). There is no push
/// channel and implementations must not retry on their own.
#[async_trait]
pub trait Transport {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Exchange one command with the device
    async fn request(&mut self, command: &[u8], data: &[u8]) -> Result<Vec<u8>, Self::Error>;
}

