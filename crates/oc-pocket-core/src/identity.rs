//! Stable identifier for a server installation.
//!
//! Derived from the server-reported state and config paths, so it stays the
//! same across server restarts and port changes on the same machine.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Opaque installation identifier (16 lowercase hex digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Derive the identity from the state and config paths.
    ///
    /// Pure: no I/O, same inputs always give the same identity.
    #[must_use]
    pub fn from_paths(state_path: &str, config_path: &str) -> Self {
        let input = format!("{}|{}", state_path.trim(), config_path.trim());
        Self(format!("{:016x}", fnv1a64(input.as_bytes())))
    }

    /// Identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Installation paths with a lazily computed identity.
#[derive(Debug)]
pub struct InstallationPaths {
    state_path: String,
    config_path: String,
    identity: OnceLock<DeviceIdentity>,
}

impl InstallationPaths {
    #[must_use]
    pub fn new(state_path: impl Into<String>, config_path: impl Into<String>) -> Self {
        Self {
            state_path: state_path.into(),
            config_path: config_path.into(),
            identity: OnceLock::new(),
        }
    }

    /// Identity for these paths, computed on first use.
    pub fn identity(&self) -> &DeviceIdentity {
        self.identity
            .get_or_init(|| DeviceIdentity::from_paths(&self.state_path, &self.config_path))
    }
}
