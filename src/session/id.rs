//! Session identifier type.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes behind a freshly minted id.
const ID_BYTES: usize = 16;

/// Opaque identifier for a client session.
///
/// Fresh ids are 16 bytes from the operating system's CSPRNG, rendered as
/// 32 lowercase hex characters. Ids arriving from cookies or imported
/// history are accepted as-is as long as they are non-empty and contain no
/// whitespace or cookie delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a new random session ID.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    fn is_valid(value: &str) -> bool {
        !value.is_empty()
            && value
                .chars()
                .all(|c| !c.is_whitespace() && !c.is_control() && c != ';' && c != ',' && c != '"')
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = crate::error::VibeStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if Self::is_valid(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(crate::error::VibeStateError::InvalidSessionId(s.into()))
        }
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
