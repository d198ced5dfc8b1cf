//! Serialized form of a sink, shipped to workers.
//!
//! A descriptor names the output format and carries the full configuration.
//! The wire form is
//!
//! ```text
//! [version: u8][sha256(payload): 32 bytes][payload: postcard]
//! ```
//!
//! and is rebuilt into a sink through a
//! [`FormatRegistry`](crate::format::FormatRegistry), see
//! [`CommittingSink::from_descriptor`](crate::sink::CommittingSink::from_descriptor).

use crate::config::Configuration;
use crate::error::{Result, SinkError};
use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current wire version.
pub const DESCRIPTOR_VERSION: u8 = 1;

const CHECKSUM_LEN: usize = 32;

/// Format name plus configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkDescriptor {
    pub format: String,
    pub configuration: Configuration,
}

impl SinkDescriptor {
    #[must_use]
    pub fn new(format: impl Into<String>, configuration: Configuration) -> Self {
        Self {
            format: format.into(),
            configuration,
        }
    }

    /// Encode to the versioned, checksummed wire form.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Descriptor`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = postcard::to_allocvec(self)
            .context("encode sink descriptor")
            .map_err(SinkError::Descriptor)?;
        let checksum = Sha256::digest(&payload);
        let mut out = Vec::with_capacity(1 + CHECKSUM_LEN + payload.len());
        out.push(DESCRIPTOR_VERSION);
        out.extend_from_slice(&checksum[..]);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decode and verify bytes produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Descriptor`] on truncated input, an unknown
    /// version, a checksum mismatch or an undecodable payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes).map_err(SinkError::Descriptor)
    }
}

fn decode(bytes: &[u8]) -> anyhow::Result<SinkDescriptor> {
    let (&version, rest) = bytes
        .split_first()
        .ok_or_else(|| anyhow!("empty sink descriptor"))?;
    if version != DESCRIPTOR_VERSION {
        bail!("unsupported sink descriptor version {version}, expected {DESCRIPTOR_VERSION}");
    }
    if rest.len() < CHECKSUM_LEN {
        bail!("sink descriptor truncated: {} bytes", bytes.len());
    }
    let (expected, payload) = rest.split_at(CHECKSUM_LEN);
    let actual = Sha256::digest(payload);
    if expected != &actual[..] {
        bail!("sink descriptor checksum mismatch");
    }
    postcard::from_bytes(payload).context("decode sink descriptor payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = SinkDescriptor::new("text", Configuration::for_output_dir("/out"))
            .to_bytes()
            .unwrap();
        bytes[0] = 9;
        let err = SinkDescriptor::from_bytes(&bytes).unwrap_err();
        assert!(format!("{:#}", anyhow::Error::from(err)).contains("version 9"));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(SinkDescriptor::from_bytes(&[]).is_err());
        assert!(SinkDescriptor::from_bytes(&[DESCRIPTOR_VERSION, 1, 2, 3]).is_err());
    }
}
