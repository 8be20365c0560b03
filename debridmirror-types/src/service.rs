//! Service tags and user credentials.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifies one of the three remote debrid backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServiceTag {
    /// Paged backend that reports a total count.
    #[serde(rename = "svc-a")]
    A,
    /// Single-shot backend that returns the whole collection at once.
    #[serde(rename = "svc-b")]
    B,
    /// Paged backend with no total count.
    #[serde(rename = "svc-c")]
    C,
}

impl ServiceTag {
    pub const ALL: [ServiceTag; 3] = [ServiceTag::A, ServiceTag::B, ServiceTag::C];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceTag::A => "svc-a",
            ServiceTag::B => "svc-b",
            ServiceTag::C => "svc-c",
        }
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown service tag: {0}")]
pub struct ParseServiceTagError(pub String);

impl FromStr for ServiceTag {
    type Err = ParseServiceTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "svc-a" => Ok(ServiceTag::A),
            "svc-b" => Ok(ServiceTag::B),
            "svc-c" => Ok(ServiceTag::C),
            other => Err(ParseServiceTagError(other.to_string())),
        }
    }
}

/// API token for one backend account.
///
/// `Debug` never prints the token; cache keys and logs use [`Credential::fingerprint`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    /// Short stable digest of the token, safe to embed in cache keys.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.fingerprint())
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
