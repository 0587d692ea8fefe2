// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Connection settings for the simulator's two TCP channels

use serde::{Deserialize, Serialize};

/// Default address of the TPM command channel
pub const DEFAULT_TPM_ADDRESS: &str = "127.0.0.1:2321";
/// Default address of the platform (power/NV) control channel
pub const DEFAULT_PLATFORM_ADDRESS: &str = "127.0.0.1:2322";

/// Command channel connection options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// `host:port` of the running TPM
    pub address: String,
}

impl TcpConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TPM_ADDRESS)
    }
}

/// Platform channel connection options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// `host:port` of the running platform
    pub address: String,
}

impl PlatformConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PLATFORM_ADDRESS)
    }
}
